//! Response document written to stdout

use serde::{Deserialize, Serialize};

/// Combined output of both prediction stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub credit_score: f64,
    /// 1 = predicted default, 0 = no default
    pub default_status: u8,
    pub default_probability: f64,
}

/// Wire form of a pipeline outcome.
///
/// Either both scores are present or neither is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionResult {
    Success {
        success: bool,
        #[serde(rename = "creditScore")]
        credit_score: f64,
        #[serde(rename = "defaultStatus")]
        default_status: u8,
        #[serde(rename = "defaultProbability")]
        default_probability: f64,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl PredictionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        PredictionResult::Failure {
            success: false,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PredictionResult::Success { .. })
    }
}

impl From<Prediction> for PredictionResult {
    fn from(prediction: Prediction) -> Self {
        PredictionResult::Success {
            success: true,
            credit_score: prediction.credit_score,
            default_status: prediction.default_status,
            default_probability: prediction.default_probability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_wire_format() {
        let result = PredictionResult::from(Prediction {
            credit_score: 612.5,
            default_status: 1,
            default_probability: 0.75,
        });

        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"success":true,"creditScore":612.5,"defaultStatus":1,"defaultProbability":0.75}"#
        );
    }

    #[test]
    fn test_failure_wire_format() {
        let result = PredictionResult::failure("Unknown action: unknown");
        assert!(!result.is_success());
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"success":false,"error":"Unknown action: unknown"}"#
        );
    }
}
