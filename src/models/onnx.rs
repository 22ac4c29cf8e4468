//! ONNX graphs as default-model artifacts

use crate::error::InferenceError;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::sync::Mutex;
use tracing::info;

/// A runnable ONNX graph taking `[1, n]` float features and producing a
/// probability as its first output.
pub struct OnnxNetwork {
    /// Running a session needs `&mut`, so callers take turns.
    session: Mutex<Session>,
    input_name: String,
}

impl std::fmt::Debug for OnnxNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxNetwork")
            .field("input_name", &self.input_name)
            .finish_non_exhaustive()
    }
}

impl OnnxNetwork {
    /// Build a session from serialized graph bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let session = Session::builder()
            .map_err(|e| e.to_string())?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| e.to_string())?
            .with_intra_threads(1)
            .map_err(|e| e.to_string())?
            .commit_from_memory(bytes)
            .map_err(|e| e.to_string())?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or("graph has no inputs")?;

        info!(input = %input_name, outputs = session.outputs.len(), "ONNX graph loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    pub fn forward(&self, features: &[f32]) -> Result<f32, InferenceError> {
        let shape = vec![1_i64, features.len() as i64];
        let input = Tensor::from_array((shape, features.to_vec())).map_err(runtime)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Runtime(format!("Lock error: {e}")))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(runtime)?;

        let (_, output) = outputs.iter().next().ok_or(InferenceError::EmptyOutput)?;
        let (_, data) = output.try_extract_tensor::<f32>().map_err(runtime)?;
        data.first().copied().ok_or(InferenceError::EmptyOutput)
    }
}

fn runtime(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Runtime(e.to_string())
}
