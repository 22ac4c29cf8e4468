//! Credit Risk Pipeline Library
//!
//! Two-stage loan risk scoring: a gradient-boosted regressor predicts a
//! credit score from the application, and a small feed-forward network uses
//! that score together with the application to predict default.

pub mod config;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod types;

pub use config::AppConfig;
pub use error::{PipelineError, PredictError};
pub use models::{DefaultPredictor, ModelPaths, ModelRegistry, ScorePredictor};
pub use pipeline::CreditRiskPipeline;
pub use types::{LoanApplication, Prediction, PredictionResult, Request};
