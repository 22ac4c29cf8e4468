//! Two-stage pipeline: credit score first, then default prediction.

use crate::config::PredictionConfig;
use crate::error::{PipelineError, PredictError, Stage};
use crate::metrics::StageTimings;
use crate::models::{DefaultPredictor, ModelRegistry, ScorePredictor};
use crate::types::{LoanApplication, Prediction, PredictionResult, Request};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs both stages against one shared model registry.
#[derive(Debug, Clone)]
pub struct CreditRiskPipeline {
    score: ScorePredictor,
    default: DefaultPredictor,
}

impl CreditRiskPipeline {
    pub fn new(models: Arc<ModelRegistry>, config: &PredictionConfig) -> Self {
        Self {
            score: ScorePredictor::new(models.clone()),
            default: DefaultPredictor::with_threshold(models, config.default_threshold),
        }
    }

    /// Predict the credit score, then feed it into the default stage.
    pub fn run(&self, app: &LoanApplication) -> Result<Prediction, PredictError> {
        let mut timings = StageTimings::start();

        let credit_score = timings.time(Stage::CreditScore, || self.score.predict(app))?;
        let (default_status, default_probability) =
            timings.time(Stage::Default, || self.default.predict(app, credit_score))?;

        timings.report();
        Ok(Prediction {
            credit_score,
            default_status,
            default_probability,
        })
    }

    /// Parse a raw request document and execute it.
    pub fn execute(&self, input: &str) -> Result<Prediction, PipelineError> {
        match Request::parse(input)? {
            Request::Predict(app) => Ok(self.run(&app)?),
        }
    }

    /// Like [`Self::execute`], with every failure folded into the response.
    pub fn handle(&self, input: &str) -> PredictionResult {
        match self.execute(input) {
            Ok(prediction) => {
                info!(
                    credit_score = prediction.credit_score,
                    default_status = prediction.default_status,
                    default_probability = prediction.default_probability,
                    "Prediction complete"
                );
                prediction.into()
            }
            Err(e) => {
                warn!(error = %e, "Prediction failed");
                PredictionResult::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use crate::models::ModelPaths;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pipeline_with_fixtures() -> (tempfile::TempDir, CreditRiskPipeline) {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let paths = fixtures::write_fixture_models(dir.path(), &mut rng).unwrap();
        let registry = Arc::new(ModelRegistry::new(paths));
        (dir, CreditRiskPipeline::new(registry, &PredictionConfig::default()))
    }

    #[test]
    fn test_unknown_action() {
        let (_dir, pipeline) = pipeline_with_fixtures();
        assert_eq!(
            pipeline.handle(r#"{"action":"unknown"}"#),
            PredictionResult::failure("Unknown action: unknown")
        );
    }

    #[test]
    fn test_stage_two_field_failure_emits_no_partial_result() {
        let (_dir, pipeline) = pipeline_with_fixtures();
        let input = r#"{"action":"predict","data":{"loanAmount":10000,"income":50000,
            "loanRate":5.5,"existingDebtPayment":500,"age":35,"loanPurpose":"Home",
            "hasMortgage":true,"hasDependents":false}}"#;

        assert_eq!(
            pipeline.handle(input),
            PredictionResult::failure("Error predicting default: missing field 'loanTerm'")
        );
    }

    #[test]
    fn test_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ModelRegistry::new(ModelPaths::under(dir.path())));
        let pipeline = CreditRiskPipeline::new(registry, &PredictionConfig::default());

        let input = r#"{"action":"predict","data":{"loanAmount":10000,"income":50000,
            "loanRate":5.5,"existingDebtPayment":500,"loanTerm":36,"age":35,
            "loanPurpose":"Home","hasMortgage":true,"hasDependents":false}}"#;
        let PredictionResult::Failure { error, .. } = pipeline.handle(input) else {
            panic!("expected a failure");
        };
        assert!(error.starts_with("Error predicting credit score: Failed to load score model"));
    }
}
