//! Model artifact loading and the process-wide model cache.
//!
//! The score model is always a LightGBM text file. The default model's
//! on-disk form is not fixed by training, so its bytes are handed to an
//! ordered list of [`LoadStrategy`]s and the first one that understands
//! them wins.

use crate::error::{InferenceError, ModelLoadError};
use crate::models::gbdt::GbdtModel;
use crate::models::network::{is_state_dict, FeedForward, ParamTensor, SequentialSpec, StateDict};
#[cfg(feature = "onnx")]
use crate::models::onnx::OnnxNetwork;
use once_cell::sync::OnceCell;
use safetensors::tensor::Dtype;
use safetensors::SafeTensors;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SCORE_MODEL_FILE: &str = "creditscore_model.txt";
pub const DEFAULT_MODEL_FILE: &str = "default_model.bin";

pub type ScoreModel = GbdtModel;
pub type DefaultModel = Network;

/// A loaded default classifier, whatever form its artifact took.
#[derive(Debug)]
pub enum Network {
    FeedForward(FeedForward),
    #[cfg(feature = "onnx")]
    Onnx(OnnxNetwork),
}

impl Network {
    /// Probability of default for one feature vector.
    pub fn forward(&self, features: &[f32]) -> Result<f32, InferenceError> {
        match self {
            Network::FeedForward(net) => net.forward(features),
            #[cfg(feature = "onnx")]
            Network::Onnx(net) => net.forward(features),
        }
    }

    /// Short name of the loaded form
    pub fn kind(&self) -> &'static str {
        match self {
            Network::FeedForward(_) => "feed_forward",
            #[cfg(feature = "onnx")]
            Network::Onnx(_) => "onnx",
        }
    }
}

/// One way of turning artifact bytes into a network.
#[derive(Debug, Clone, Copy)]
pub struct LoadStrategy {
    pub name: &'static str,
    pub load: fn(&[u8]) -> Result<Network, String>,
}

/// Strategies tried for the default model, in order.
pub fn default_model_strategies() -> Vec<LoadStrategy> {
    let mut strategies = vec![LoadStrategy {
        name: "safetensors",
        load: load_safetensors,
    }];
    #[cfg(feature = "onnx")]
    strategies.push(LoadStrategy {
        name: "onnx",
        load: |bytes| OnnxNetwork::from_bytes(bytes).map(Network::Onnx),
    });
    strategies.push(LoadStrategy {
        name: "json",
        load: load_json,
    });
    strategies
}

/// Tensor archive holding a state dict.
fn load_safetensors(bytes: &[u8]) -> Result<Network, String> {
    let archive = SafeTensors::deserialize(bytes).map_err(|e| e.to_string())?;

    let names = archive.names();
    if !is_state_dict(names.iter().map(|name| name.as_str())) {
        return Err(format!(
            "no recognizable layer key among {} tensor(s)",
            names.len()
        ));
    }

    let mut state = StateDict::new();
    for (name, view) in archive.tensors() {
        let data = match view.dtype() {
            Dtype::F32 => view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            Dtype::F64 => view
                .data()
                .chunks_exact(8)
                .map(|b| {
                    let mut buf = [0_u8; 8];
                    buf.copy_from_slice(b);
                    f64::from_le_bytes(buf) as f32
                })
                .collect(),
            other => return Err(format!("unsupported dtype {other:?} for tensor '{name}'")),
        };
        state.insert(
            name,
            ParamTensor {
                shape: view.shape().to_vec(),
                data,
            },
        );
    }

    FeedForward::from_state_dict(&state).map(Network::FeedForward)
}

/// JSON document: either a state dict of nested lists or a layer list.
fn load_json(bytes: &[u8]) -> Result<Network, String> {
    let document: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;

    if let Value::Object(map) = &document {
        if is_state_dict(map.keys().map(String::as_str)) {
            let state = map
                .iter()
                .map(|(key, value)| {
                    json_tensor(value)
                        .map(|tensor| (key.clone(), tensor))
                        .map_err(|e| format!("{key}: {e}"))
                })
                .collect::<Result<StateDict, String>>()?;
            return FeedForward::from_state_dict(&state).map(Network::FeedForward);
        }

        if map.contains_key("layers") {
            let spec: SequentialSpec =
                serde_json::from_value(document.clone()).map_err(|e| e.to_string())?;
            return FeedForward::from_spec(spec).map(Network::FeedForward);
        }
    }

    Err(format!(
        "Unknown model format in JSON document: {}",
        json_type(&document)
    ))
}

/// Nested JSON lists as a rectangular tensor.
fn json_tensor(value: &Value) -> Result<ParamTensor, String> {
    match value {
        Value::Number(n) => Ok(ParamTensor {
            shape: Vec::new(),
            data: vec![n.as_f64().unwrap_or(f64::NAN) as f32],
        }),
        Value::Array(items) => {
            let mut inner: Option<Vec<usize>> = None;
            let mut data = Vec::new();
            for item in items {
                let child = json_tensor(item)?;
                match &inner {
                    Some(shape) if *shape != child.shape => {
                        return Err("nested lists have different lengths".to_string())
                    }
                    Some(_) => {}
                    None => inner = Some(child.shape.clone()),
                }
                data.extend(child.data);
            }
            let mut shape = vec![items.len()];
            shape.extend(inner.unwrap_or_default());
            Ok(ParamTensor { shape, data })
        }
        other => Err(format!("expected number or list, found {}", json_type(other))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read and parse the score model.
pub fn load_score_model(path: &Path) -> Result<ScoreModel, ModelLoadError> {
    info!(path = %path.display(), "Loading score model");

    let fail = |reason: String| ModelLoadError::ScoreModel {
        path: path.to_path_buf(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
    let model = GbdtModel::from_text(&text).map_err(|e| fail(e.to_string()))?;

    info!(
        trees = model.num_trees(),
        features = model.num_features(),
        "Score model loaded"
    );
    Ok(model)
}

/// Read the default model once and try each strategy on its bytes.
///
/// A read failure is reported against every strategy.
pub fn load_default_model(
    path: &Path,
    strategies: &[LoadStrategy],
) -> Result<DefaultModel, ModelLoadError> {
    info!(path = %path.display(), "Loading default model");

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            let reason = e.to_string();
            return Err(ModelLoadError::DefaultModel {
                path: path.to_path_buf(),
                failures: strategies.iter().map(|s| (s.name, reason.clone())).collect(),
            });
        }
    };

    let mut failures = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        match (strategy.load)(&bytes) {
            Ok(network) => {
                info!(
                    strategy = strategy.name,
                    kind = network.kind(),
                    "Default model loaded"
                );
                return Ok(network);
            }
            Err(e) => {
                debug!(
                    strategy = strategy.name,
                    error = %e,
                    "Default model format not recognized"
                );
                failures.push((strategy.name, e));
            }
        }
    }

    Err(ModelLoadError::DefaultModel {
        path: path.to_path_buf(),
        failures,
    })
}

/// Locations of both model artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub score_model: PathBuf,
    pub default_model: PathBuf,
}

impl ModelPaths {
    /// Both artifacts under `root` with their standard file names.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            score_model: root.join(SCORE_MODEL_FILE),
            default_model: root.join(DEFAULT_MODEL_FILE),
        }
    }
}

/// Lazily loaded, shared model handles.
///
/// Each model is loaded at most once per registry. Concurrent first callers
/// block until the single load finishes and then all see its outcome; a
/// failed load is cached too and is not retried.
pub struct ModelRegistry {
    paths: ModelPaths,
    strategies: Vec<LoadStrategy>,
    score: OnceCell<Result<Arc<ScoreModel>, ModelLoadError>>,
    default: OnceCell<Result<Arc<DefaultModel>, ModelLoadError>>,
}

impl ModelRegistry {
    /// Create a registry using the standard default-model strategies
    pub fn new(paths: ModelPaths) -> Self {
        Self::with_strategies(paths, default_model_strategies())
    }

    /// Create a registry with a custom strategy list
    pub fn with_strategies(paths: ModelPaths, strategies: Vec<LoadStrategy>) -> Self {
        Self {
            paths,
            strategies,
            score: OnceCell::new(),
            default: OnceCell::new(),
        }
    }

    /// Model file locations
    pub fn paths(&self) -> &ModelPaths {
        &self.paths
    }

    /// Default-model strategy names, in the order they are tried
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name).collect()
    }

    /// Score model, loaded on first use. Later calls return the same
    /// handle or the same error.
    pub fn score_model(&self) -> Result<Arc<ScoreModel>, ModelLoadError> {
        self.score
            .get_or_init(|| {
                load_score_model(&self.paths.score_model)
                    .map(Arc::new)
                    .inspect_err(|e| warn!(error = %e, "Score model unavailable"))
            })
            .clone()
    }

    /// Default model, loaded on first use. Later calls return the same
    /// handle or the same error.
    pub fn default_model(&self) -> Result<Arc<DefaultModel>, ModelLoadError> {
        self.default
            .get_or_init(|| {
                load_default_model(&self.paths.default_model, &self.strategies)
                    .map(Arc::new)
                    .inspect_err(|e| warn!(error = %e, "Default model unavailable"))
            })
            .clone()
    }

    /// Whether the `(score, default)` models have loaded successfully
    pub fn is_loaded(&self) -> (bool, bool) {
        (
            matches!(self.score.get(), Some(Ok(_))),
            matches!(self.default.get(), Some(Ok(_))),
        )
    }

    /// Forget both cached outcomes so the next call loads again.
    pub fn reset(&mut self) {
        self.score.take();
        self.default.take();
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("paths", &self.paths)
            .field("strategies", &self.strategy_names())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture_dir() -> (TempDir, ModelPaths) {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let paths = fixtures::write_fixture_models(dir.path(), &mut rng).unwrap();
        (dir, paths)
    }

    #[test]
    fn test_models_are_cached() {
        let (_dir, paths) = fixture_dir();
        let registry = ModelRegistry::new(paths.clone());
        assert_eq!(registry.is_loaded(), (false, false));

        let score = registry.score_model().unwrap();
        let default = registry.default_model().unwrap();
        assert_eq!(registry.is_loaded(), (true, true));
        assert_eq!(default.kind(), "feed_forward");

        // Later calls must not touch the files again.
        fs::remove_file(&paths.score_model).unwrap();
        fs::remove_file(&paths.default_model).unwrap();

        assert!(Arc::ptr_eq(&score, &registry.score_model().unwrap()));
        assert!(Arc::ptr_eq(&default, &registry.default_model().unwrap()));
    }

    #[test]
    fn test_concurrent_first_access_loads_once() {
        let (_dir, paths) = fixture_dir();
        let registry = ModelRegistry::new(paths);

        let handles: Vec<Arc<DefaultModel>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.default_model().unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_missing_default_model_reports_every_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(ModelPaths::under(dir.path()));

        let err = registry.default_model().unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Failed to load default model."));
        assert!(message.contains("safetensors error:"));
        assert!(message.contains("json error:"));

        let ModelLoadError::DefaultModel { failures, .. } = err else {
            panic!("expected a default model error");
        };
        assert_eq!(failures.len(), registry.strategy_names().len());
    }

    #[test]
    fn test_corrupt_default_model() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ModelPaths::under(dir.path());
        fs::write(&paths.default_model, b"\x80\x04garbage").unwrap();

        let err = ModelRegistry::new(paths).default_model().unwrap_err();
        let ModelLoadError::DefaultModel { failures, .. } = &err else {
            panic!("expected a default model error");
        };
        assert_eq!(failures.first().map(|f| f.0), Some("safetensors"));
        assert_eq!(failures.last().map(|f| f.0), Some("json"));
        assert!(err.to_string().contains("json error: "));
    }

    #[test]
    fn test_failure_is_cached_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ModelRegistry::new(ModelPaths::under(dir.path()));
        assert!(matches!(
            registry.score_model(),
            Err(ModelLoadError::ScoreModel { .. })
        ));

        let mut rng = StdRng::seed_from_u64(1);
        fixtures::write_fixture_models(dir.path(), &mut rng).unwrap();
        assert!(registry.score_model().is_err());

        registry.reset();
        assert!(registry.score_model().is_ok());
    }

    #[test]
    fn test_json_state_dict() {
        let mut rng = StdRng::seed_from_u64(3);
        let state = fixtures::random_state_dict(&mut rng);
        let bytes = serde_json::to_vec(&fixtures::state_dict_to_json(&state)).unwrap();

        let network = load_json(&bytes).unwrap();
        assert_eq!(network.kind(), "feed_forward");
        // The safetensors strategy must reject the same bytes.
        assert!(load_safetensors(&bytes).is_err());
    }

    #[test]
    fn test_json_layer_list() {
        let document = json!({
            "layers": [
                { "weight": [[0.0, 0.0]], "bias": [0.0], "activation": "sigmoid" }
            ]
        });
        let network = load_json(document.to_string().as_bytes()).unwrap();
        assert_eq!(network.forward(&[1.0, 2.0]).unwrap(), 0.5);
    }

    #[test]
    fn test_json_unknown_format() {
        let err = load_json(b"[1, 2, 3]").unwrap_err();
        assert_eq!(err, "Unknown model format in JSON document: array");

        let err = load_json(br#"{"fc1.weight": [[1, 2], [3]]}"#).unwrap_err();
        assert!(err.contains("nested lists have different lengths"));
    }

    #[test]
    fn test_safetensors_without_layer_keys() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = fixtures::random_state_dict(&mut rng);
        let weight = state.remove("fc1.weight").unwrap();
        state.remove("fc1.bias");
        state.insert("encoder.weight".to_string(), weight);

        let bytes = fixtures::state_dict_to_safetensors(&state).unwrap();
        let err = load_safetensors(&bytes).unwrap_err();
        assert!(err.contains("no recognizable layer key"));
    }

    #[test]
    fn test_score_model_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ModelPaths::under(dir.path());
        fs::write(&paths.score_model, "{}").unwrap();

        let err = load_score_model(&paths.score_model).unwrap_err();
        assert!(err.to_string().contains("not a LightGBM text model"));
    }
}
