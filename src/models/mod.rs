//! Model artifacts, the model cache and the stage predictors

pub mod fixtures;
pub mod gbdt;
pub mod inference;
pub mod loader;
pub mod network;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use gbdt::GbdtModel;
pub use inference::{DefaultPredictor, ScorePredictor};
pub use loader::{ModelPaths, ModelRegistry, Network};
