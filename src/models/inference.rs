//! Stage predictors: features in, model outputs out.

use crate::error::{PredictError, Stage, StageFailure};
use crate::features::{DefaultFeatureBuilder, ScoreFeatureBuilder};
use crate::models::loader::ModelRegistry;
use crate::types::LoanApplication;
use std::sync::Arc;
use tracing::debug;

/// Probability above which a loan is classified as a default.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Label for a default probability. The threshold itself maps to 0.
pub fn classify(probability: f64, threshold: f64) -> u8 {
    if probability > threshold {
        1
    } else {
        0
    }
}

/// Stage 1: predicts a credit score with the gradient-boosted regressor.
#[derive(Debug, Clone)]
pub struct ScorePredictor {
    models: Arc<ModelRegistry>,
    features: ScoreFeatureBuilder,
}

impl ScorePredictor {
    /// Create a score predictor drawing its model from `models`
    pub fn new(models: Arc<ModelRegistry>) -> Self {
        Self {
            models,
            features: ScoreFeatureBuilder::new(),
        }
    }

    /// Predict the credit score for one application.
    pub fn predict(&self, app: &LoanApplication) -> Result<f64, PredictError> {
        self.try_predict(app)
            .map_err(|failure| PredictError::wrap(Stage::CreditScore, failure))
    }

    fn try_predict(&self, app: &LoanApplication) -> Result<f64, StageFailure> {
        let features = self.features.build(app)?;
        let model = self.models.score_model()?;

        let score = model.predict(&features)?;

        debug!(features = ?features, credit_score = score, "Credit score predicted");
        Ok(score)
    }
}

/// Stage 2: predicts default from the application and the stage 1 score.
#[derive(Debug, Clone)]
pub struct DefaultPredictor {
    models: Arc<ModelRegistry>,
    features: DefaultFeatureBuilder,
    threshold: f64,
}

impl DefaultPredictor {
    /// Create a default predictor using [`DEFAULT_THRESHOLD`]
    pub fn new(models: Arc<ModelRegistry>) -> Self {
        Self::with_threshold(models, DEFAULT_THRESHOLD)
    }

    /// Create a default predictor with a custom decision threshold
    pub fn with_threshold(models: Arc<ModelRegistry>, threshold: f64) -> Self {
        Self {
            models,
            features: DefaultFeatureBuilder::new(),
            threshold,
        }
    }

    /// Probability above which a loan is labelled as a default
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Predict default from the application and its stage 1 score.
    ///
    /// Returns `(label, probability)`. A NaN probability is labelled 0.
    pub fn predict(
        &self,
        app: &LoanApplication,
        credit_score: f64,
    ) -> Result<(u8, f64), PredictError> {
        self.try_predict(app, credit_score)
            .map_err(|failure| PredictError::wrap(Stage::Default, failure))
    }

    fn try_predict(
        &self,
        app: &LoanApplication,
        credit_score: f64,
    ) -> Result<(u8, f64), StageFailure> {
        let features = self.features.build(app, credit_score)?;
        let model = self.models.default_model()?;

        // The network runs in single precision.
        let input: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let probability = f64::from(model.forward(&input)?);
        let label = classify(probability, self.threshold);

        debug!(
            features = ?features,
            probability,
            label,
            threshold = self.threshold,
            "Default predicted"
        );
        Ok((label, probability))
    }
}
