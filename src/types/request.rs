//! Request document read from stdin

use crate::error::InputError;
use crate::types::application::LoanApplication;
use serde_json::Value;

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Predict(LoanApplication),
}

impl Request {
    /// Parse a raw request document.
    ///
    /// Only the `predict` action exists; `data` must be a JSON object.
    pub fn parse(input: &str) -> Result<Self, InputError> {
        if input.is_empty() {
            return Err(InputError::NoInput);
        }

        let document: Value =
            serde_json::from_str(input).map_err(|e| InputError::InvalidJson(e.to_string()))?;

        let action = document.get("action").unwrap_or(&Value::Null);
        match action.as_str() {
            Some("predict") => {
                let data = document
                    .get("data")
                    .ok_or(InputError::MissingField("data"))?;
                let application = serde_json::from_value(data.clone())
                    .map_err(|e| InputError::InvalidJson(format!("data: {e}")))?;
                Ok(Request::Predict(application))
            }
            Some(other) => Err(InputError::UnknownAction(other.to_string())),
            None => Err(InputError::UnknownAction(action.to_string())),
        }
    }
}
