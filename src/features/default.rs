//! Stage 2 features for the default classifier.

use crate::error::FeatureError;
use crate::features::purpose::{map_loan_purpose, OTHER_PURPOSE};
use crate::features::scaling::standardize_columns;
use crate::types::application::dti_ratio;
use crate::types::LoanApplication;
use ndarray::Array2;

pub const DEFAULT_FEATURE_COUNT: usize = 10;

/// Leading columns that are standardized; the rest are categorical codes.
pub const STANDARDIZED_COLUMNS: usize = 7;

/// Index of the stage 1 credit score within the stage 2 vector.
pub const CREDIT_SCORE_INDEX: usize = 3;

/// Stage 2 feature names, in model input order.
pub const DEFAULT_FEATURE_NAMES: [&str; DEFAULT_FEATURE_COUNT] = [
    "Age",
    "Income",
    "LoanAmount",
    "CreditScore",
    "InterestRate",
    "LoanTerm",
    "DTIRatio",
    "LoanPurpose",
    "HasMortgage",
    "HasDependents",
];

/// Builds the ten-feature vector consumed by the default classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFeatureBuilder;

impl DefaultFeatureBuilder {
    /// Create a new stage 2 feature builder
    pub fn new() -> Self {
        Self
    }

    /// Unscaled stage 2 row, in [`DEFAULT_FEATURE_NAMES`] order.
    ///
    /// The DTI ratio is recomputed from the application rather than taken
    /// from stage 1.
    pub fn raw_row(
        &self,
        app: &LoanApplication,
        credit_score: f64,
    ) -> Result<[f64; DEFAULT_FEATURE_COUNT], FeatureError> {
        let income = app.number("income")?;
        let dti_ratio = dti_ratio(app.existing_debt_payment()?, income);
        let age = app.number("age")?;
        let loan_amount = app.number("loanAmount")?;
        let loan_rate = app.number("loanRate")?;
        let loan_term = app.number("loanTerm")?;
        let loan_purpose = app
            .loan_purpose()?
            .map(map_loan_purpose)
            .unwrap_or(OTHER_PURPOSE);
        let has_mortgage = app.flag("hasMortgage")?;
        let has_dependents = app.flag("hasDependents")?;

        Ok([
            age,
            income,
            loan_amount,
            credit_score,
            loan_rate,
            loan_term,
            dti_ratio,
            f64::from(loan_purpose),
            if has_mortgage { 1.0 } else { 0.0 },
            if has_dependents { 1.0 } else { 0.0 },
        ])
    }

    /// Standardize the numeric columns of a raw row, fitted to that row alone.
    ///
    /// NaN passes through; an infinite numeric column is an error.
    pub fn derive(
        &self,
        raw: [f64; DEFAULT_FEATURE_COUNT],
    ) -> Result<[f64; DEFAULT_FEATURE_COUNT], FeatureError> {
        let mut numeric = Array2::from_shape_fn((1, STANDARDIZED_COLUMNS), |(_, j)| raw[j]);
        standardize_columns(&mut numeric, &DEFAULT_FEATURE_NAMES[..STANDARDIZED_COLUMNS])?;

        let mut features = raw;
        for (feature, &value) in features.iter_mut().zip(numeric.iter()) {
            *feature = value;
        }
        Ok(features)
    }

    /// Read and standardize in one step.
    pub fn build(
        &self,
        app: &LoanApplication,
        credit_score: f64,
    ) -> Result<[f64; DEFAULT_FEATURE_COUNT], FeatureError> {
        self.derive(self.raw_row(app, credit_score)?)
    }

    /// Number of features produced
    pub fn feature_count(&self) -> usize {
        DEFAULT_FEATURE_COUNT
    }

    /// Feature names, in model input order
    pub fn feature_names(&self) -> &'static [&'static str] {
        &DEFAULT_FEATURE_NAMES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> LoanApplication {
        serde_json::from_value(json!({
            "loanAmount": 10000,
            "income": 50000,
            "loanRate": 5.5,
            "existingDebtPayment": 500,
            "loanTerm": 36,
            "age": 35,
            "loanPurpose": "Automobile",
            "hasMortgage": false,
            "hasDependents": true,
        }))
        .unwrap()
    }

    #[test]
    fn test_raw_row_order() {
        let builder = DefaultFeatureBuilder::new();
        let row = builder.raw_row(&sample(), 642.5).unwrap();

        assert_eq!(row.len(), builder.feature_count());
        assert_eq!(builder.feature_names()[CREDIT_SCORE_INDEX], "CreditScore");
        assert_eq!(
            row,
            [35.0, 50000.0, 10000.0, 642.5, 5.5, 36.0, 1.0, 4.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_single_row_standardization_zeroes_numeric_columns() {
        let features = DefaultFeatureBuilder::new().build(&sample(), 642.5).unwrap();

        assert_eq!(&features[..STANDARDIZED_COLUMNS], &[0.0; STANDARDIZED_COLUMNS]);
        assert_eq!(&features[STANDARDIZED_COLUMNS..], &[4.0, 0.0, 1.0]);
    }

    #[test]
    fn test_infinite_input_rejected() {
        let builder = DefaultFeatureBuilder::new();
        assert_eq!(
            builder.build(&sample().with("loanTerm", "inf"), 600.0),
            Err(FeatureError::NonFinite {
                field: "LoanTerm".to_string()
            })
        );
        assert_eq!(
            builder.build(&sample(), f64::INFINITY),
            Err(FeatureError::NonFinite {
                field: "CreditScore".to_string()
            })
        );
    }

    #[test]
    fn test_nan_input_passes_through() {
        let features = DefaultFeatureBuilder::new()
            .build(&sample().with("age", "nan"), 600.0)
            .unwrap();
        assert!(features[0].is_nan());
        assert_eq!(&features[1..STANDARDIZED_COLUMNS], &[0.0; STANDARDIZED_COLUMNS - 1]);
    }

    #[test]
    fn test_loan_term_required() {
        let app: LoanApplication = serde_json::from_value(json!({
            "loanAmount": 10000,
            "income": 50000,
            "loanRate": 5.5,
            "existingDebtPayment": 500,
            "age": 35,
            "loanPurpose": "Home",
            "hasMortgage": false,
            "hasDependents": true,
        }))
        .unwrap();

        assert_eq!(
            DefaultFeatureBuilder::new().build(&app, 600.0),
            Err(FeatureError::MissingField("loanTerm".to_string()))
        );
    }
}
