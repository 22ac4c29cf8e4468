//! Loan application as submitted by the caller.
//!
//! Fields are kept as raw JSON and coerced on demand, so each prediction
//! stage only fails on the fields it actually reads.

use crate::error::FeatureError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw loan application fields, keyed by their camelCase request names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanApplication {
    fields: Map<String, Value>,
}

impl LoanApplication {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Set a field, replacing any previous value.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Borrow a raw field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn require(&self, key: &str) -> Result<&Value, FeatureError> {
        self.fields
            .get(key)
            .ok_or_else(|| FeatureError::MissingField(key.to_string()))
    }

    /// Read a field as a float.
    ///
    /// Numbers are taken as-is, strings are parsed after trimming, booleans
    /// become 1.0 / 0.0. Anything else is rejected.
    pub fn number(&self, key: &str) -> Result<f64, FeatureError> {
        let value = self.require(key)?;
        let not_numeric = || FeatureError::NotNumeric {
            field: key.to_string(),
            value: value.to_string(),
        };

        match value {
            Value::Number(n) => n.as_f64().ok_or_else(not_numeric),
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| not_numeric()),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            _ => Err(not_numeric()),
        }
    }

    /// Read a boolean-like field using JSON truthiness.
    pub fn flag(&self, key: &str) -> Result<bool, FeatureError> {
        let truthy = match self.require(key)? {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        };
        Ok(truthy)
    }

    /// Existing monthly debt payment. Older clients send the plural key.
    pub fn existing_debt_payment(&self) -> Result<f64, FeatureError> {
        if !self.fields.contains_key("existingDebtPayment")
            && self.fields.contains_key("existingDebtPayments")
        {
            return self.number("existingDebtPayments");
        }
        self.number("existingDebtPayment")
    }

    /// Loan purpose label. `None` when present but not a string.
    pub fn loan_purpose(&self) -> Result<Option<&str>, FeatureError> {
        Ok(self.require("loanPurpose")?.as_str())
    }

    /// Debt-to-income ratio in percent; zero when income is not positive.
    pub fn dti_ratio(&self) -> Result<f64, FeatureError> {
        let income = self.number("income")?;
        let existing_debt = self.existing_debt_payment()?;
        Ok(dti_ratio(existing_debt, income))
    }
}

/// Debt-to-income ratio in percent; zero when income is not positive.
pub fn dti_ratio(existing_debt: f64, income: f64) -> f64 {
    if income > 0.0 {
        existing_debt / income * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn application(value: Value) -> LoanApplication {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numeric_coercion() {
        let app = application(json!({
            "income": "50000",
            "age": 35,
            "loanRate": " 5.5 ",
            "hasMortgage": true,
        }));

        assert_eq!(app.number("income").unwrap(), 50000.0);
        assert_eq!(app.number("age").unwrap(), 35.0);
        assert_eq!(app.number("loanRate").unwrap(), 5.5);
        assert_eq!(app.number("hasMortgage").unwrap(), 1.0);
    }

    #[test]
    fn test_numeric_coercion_failures() {
        let app = application(json!({ "income": "lots", "age": null }));

        assert!(matches!(
            app.number("income"),
            Err(FeatureError::NotNumeric { .. })
        ));
        assert!(matches!(
            app.number("age"),
            Err(FeatureError::NotNumeric { .. })
        ));
        assert_eq!(
            app.number("loanAmount"),
            Err(FeatureError::MissingField("loanAmount".to_string()))
        );
    }

    #[test]
    fn test_flag_truthiness() {
        let app = application(json!({
            "a": false, "b": 0, "c": "", "d": null, "e": [],
            "f": true, "g": 2, "h": "no", "i": [0],
        }));

        for key in ["a", "b", "c", "d", "e"] {
            assert!(!app.flag(key).unwrap(), "{key} should be false");
        }
        for key in ["f", "g", "h", "i"] {
            assert!(app.flag(key).unwrap(), "{key} should be true");
        }
        assert!(app.flag("missing").is_err());
    }

    #[test]
    fn test_dti_ratio() {
        assert_eq!(dti_ratio(500.0, 50000.0), 1.0);
        assert_eq!(dti_ratio(500.0, 0.0), 0.0);
        assert_eq!(dti_ratio(500.0, -10.0), 0.0);
    }

    #[test]
    fn test_existing_debt_alias() {
        let app = application(json!({ "income": 1000, "existingDebtPayments": 100 }));
        assert_eq!(app.dti_ratio().unwrap(), 10.0);

        let app = application(json!({
            "income": 1000,
            "existingDebtPayment": 50,
            "existingDebtPayments": 100,
        }));
        assert_eq!(app.dti_ratio().unwrap(), 5.0);
    }

    #[test]
    fn test_loan_purpose_non_string() {
        let app = application(json!({ "loanPurpose": 4 }));
        assert_eq!(app.loan_purpose().unwrap(), None);
    }
}
