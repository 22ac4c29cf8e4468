//! Error types for the credit risk pipeline.
//!
//! Each stage has its own error type; the predictors wrap whatever fails
//! inside them into a [`PredictError`] that names the stage, and the
//! pipeline folds everything into a [`PipelineError`] whose `Display` is the
//! `error` string written to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Problems with the request document itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("No input provided")]
    NoInput,

    #[error("Invalid JSON input: {0}")]
    InvalidJson(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// Failure while turning raw application fields into model features.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("could not convert field '{field}' to float: {value}")]
    NotNumeric { field: String, value: String },

    #[error("input contains NaN or infinity in '{field}'")]
    NonFinite { field: String },
}

/// A model artifact could not be read or understood.
///
/// Cloneable so the registry can hand the same cached failure to every
/// caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelLoadError {
    #[error("Failed to load score model from {}: {reason}", path.display())]
    ScoreModel { path: PathBuf, reason: String },

    #[error("Failed to load default model. {}", format_failures(failures))]
    DefaultModel {
        path: PathBuf,
        /// `(strategy, message)` for every strategy that was tried, in order.
        failures: Vec<(&'static str, String)>,
    },
}

fn format_failures(failures: &[(&'static str, String)]) -> String {
    failures
        .iter()
        .map(|(strategy, message)| format!("{strategy} error: {message}."))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Failure while executing a loaded model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error("expected {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("model produced no output")]
    EmptyOutput,

    #[error("inference runtime error: {0}")]
    Runtime(String),
}

/// Anything that can go wrong inside one prediction stage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StageFailure {
    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Which prediction stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreditScore,
    Default,
}

/// A stage failure tagged with the stage it came from.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    #[error("Error predicting credit score: {0}")]
    CreditScore(#[source] StageFailure),

    #[error("Error predicting default: {0}")]
    Default(#[source] StageFailure),
}

impl PredictError {
    /// Tag a failure with the stage it happened in
    pub fn wrap(stage: Stage, failure: impl Into<StageFailure>) -> Self {
        match stage {
            Stage::CreditScore => PredictError::CreditScore(failure.into()),
            Stage::Default => PredictError::Default(failure.into()),
        }
    }

    /// Stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            PredictError::CreditScore(_) => Stage::CreditScore,
            PredictError::Default(_) => Stage::Default,
        }
    }

    /// Underlying failure, without the stage prefix
    pub fn failure(&self) -> &StageFailure {
        match self {
            PredictError::CreditScore(failure) | PredictError::Default(failure) => failure,
        }
    }
}

/// Top-level error for one request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Predict(#[from] PredictError),
}
