//! Feed-forward default classifier.
//!
//! The canonical architecture is
//! `Linear(10, 64) -> ReLU -> Linear(64, 32) -> ReLU -> Linear(32, 1) -> Sigmoid`,
//! with parameters named `fc1.weight`, `fc1.bias`, ... as in the training
//! code's state dict. Weights are stored `[out, in]`.

use crate::error::InferenceError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const INPUT_SIZE: usize = 10;
pub const HIDDEN_SIZES: [usize; 2] = [64, 32];
pub const OUTPUT_SIZE: usize = 1;

/// Parameter names that mark a mapping as a state dict for this network.
pub const STATE_DICT_MARKERS: [&str; 2] = ["fc1.weight", "fc1.bias"];

/// A named parameter tensor, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

pub type StateDict = HashMap<String, ParamTensor>;

/// True when the mapping holds at least one recognizable layer key.
pub fn is_state_dict<'a>(mut keys: impl Iterator<Item = &'a str>) -> bool {
    keys.any(|key| STATE_DICT_MARKERS.contains(&key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Identity,
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            // NaN must survive; `f32::max` would turn it into 0.
            Activation::Relu => {
                if x.is_nan() || x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// Fully connected layer followed by an activation.
#[derive(Debug, Clone)]
pub struct Dense {
    weight: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl Dense {
    pub fn new(
        weight: Array2<f32>,
        bias: Array1<f32>,
        activation: Activation,
    ) -> Result<Self, String> {
        if weight.nrows() != bias.len() {
            return Err(format!(
                "weight has {} rows but bias has {} entries",
                weight.nrows(),
                bias.len()
            ));
        }
        Ok(Self {
            weight,
            bias,
            activation,
        })
    }

    /// Number of inputs the layer expects
    pub fn input_size(&self) -> usize {
        self.weight.ncols()
    }

    /// Number of outputs the layer produces
    pub fn output_size(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, x: &Array1<f32>) -> Array1<f32> {
        let mut z = self.weight.dot(x) + &self.bias;
        z.mapv_inplace(|v| self.activation.apply(v));
        z
    }
}

/// Serialized form of a whole network, layer by layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialSpec {
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    pub weight: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

/// Immutable stack of dense layers ending in a single output.
#[derive(Debug, Clone)]
pub struct FeedForward {
    layers: Vec<Dense>,
}

impl FeedForward {
    pub fn new(layers: Vec<Dense>) -> Result<Self, String> {
        let first = layers.first().ok_or("network has no layers")?;
        let mut width = first.input_size();
        for (i, layer) in layers.iter().enumerate() {
            if layer.input_size() != width {
                return Err(format!(
                    "layer {i} expects {} inputs, previous layer produces {width}",
                    layer.input_size()
                ));
            }
            width = layer.output_size();
        }
        if width != OUTPUT_SIZE {
            return Err(format!("network produces {width} outputs, expected {OUTPUT_SIZE}"));
        }
        Ok(Self { layers })
    }

    /// Bind a state dict into the canonical architecture.
    ///
    /// Binding is strict: every parameter must be present with its exact
    /// shape and no extra parameters are allowed.
    pub fn from_state_dict(state: &StateDict) -> Result<Self, String> {
        let sizes = [INPUT_SIZE, HIDDEN_SIZES[0], HIDDEN_SIZES[1], OUTPUT_SIZE];
        let activations = [Activation::Relu, Activation::Relu, Activation::Sigmoid];

        let mut expected_keys = Vec::with_capacity(6);
        let mut layers = Vec::with_capacity(3);
        for (i, activation) in activations.into_iter().enumerate() {
            let (fan_in, fan_out) = (sizes[i], sizes[i + 1]);
            let weight_key = format!("fc{}.weight", i + 1);
            let bias_key = format!("fc{}.bias", i + 1);

            let weight = take_param(state, &weight_key, &[fan_out, fan_in])?;
            let bias = take_param(state, &bias_key, &[fan_out])?;
            let weight = Array2::from_shape_vec((fan_out, fan_in), weight)
                .map_err(|e| format!("{weight_key}: {e}"))?;
            layers.push(Dense::new(weight, Array1::from(bias), activation)?);

            expected_keys.push(weight_key);
            expected_keys.push(bias_key);
        }

        let mut unexpected: Vec<&str> = state
            .keys()
            .map(String::as_str)
            .filter(|key| !expected_keys.iter().any(|k| k.as_str() == *key))
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort_unstable();
            return Err(format!("unexpected key(s) in state dict: {}", unexpected.join(", ")));
        }

        Self::new(layers)
    }

    /// Build a network from its serialized layer list.
    pub fn from_spec(spec: SequentialSpec) -> Result<Self, String> {
        let layers = spec
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, layer)| {
                let rows = layer.weight.len();
                let cols = layer.weight.first().map_or(0, Vec::len);
                if layer.weight.iter().any(|row| row.len() != cols) {
                    return Err(format!("layer {i}: weight rows have different lengths"));
                }
                let weight = Array2::from_shape_vec((rows, cols), layer.weight.concat())
                    .map_err(|e| format!("layer {i}: {e}"))?;
                Dense::new(weight, Array1::from(layer.bias), layer.activation)
                    .map_err(|e| format!("layer {i}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(layers)
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Run the network on one feature vector and return its single output.
    pub fn forward(&self, features: &[f32]) -> Result<f32, InferenceError> {
        if features.len() != self.input_size() {
            return Err(InferenceError::FeatureCount {
                expected: self.input_size(),
                actual: features.len(),
            });
        }

        let mut x = Array1::from(features.to_vec());
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        x.get(0).copied().ok_or(InferenceError::EmptyOutput)
    }
}

fn take_param(state: &StateDict, key: &str, shape: &[usize]) -> Result<Vec<f32>, String> {
    let param = state
        .get(key)
        .ok_or_else(|| format!("missing key '{key}' in state dict"))?;
    if param.shape != shape {
        return Err(format!(
            "size mismatch for {key}: expected {shape:?}, found {:?}",
            param.shape
        ));
    }
    Ok(param.data.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_state_dict(value: f32) -> StateDict {
        let sizes = [INPUT_SIZE, HIDDEN_SIZES[0], HIDDEN_SIZES[1], OUTPUT_SIZE];
        let mut state = StateDict::new();
        for i in 0..3 {
            let (fan_in, fan_out) = (sizes[i], sizes[i + 1]);
            state.insert(
                format!("fc{}.weight", i + 1),
                ParamTensor {
                    shape: vec![fan_out, fan_in],
                    data: vec![value; fan_out * fan_in],
                },
            );
            state.insert(
                format!("fc{}.bias", i + 1),
                ParamTensor {
                    shape: vec![fan_out],
                    data: vec![0.0; fan_out],
                },
            );
        }
        state
    }

    #[test]
    fn test_zero_weights_give_half() {
        let net = FeedForward::from_state_dict(&constant_state_dict(0.0)).unwrap();
        assert_eq!(net.num_layers(), 3);
        assert_eq!(net.input_size(), INPUT_SIZE);
        assert_eq!(net.forward(&[1.0; INPUT_SIZE]).unwrap(), 0.5);
    }

    #[test]
    fn test_forward_matches_hand_computation() {
        let net = FeedForward::from_state_dict(&constant_state_dict(0.01)).unwrap();

        // fc1: 10 * 0.01 = 0.1, fc2: 64 * 0.01 * 0.1 = 0.064,
        // fc3: 32 * 0.01 * 0.064 = 0.02048
        let expected = 1.0 / (1.0 + (-0.02048_f32).exp());
        let output = net.forward(&[1.0; INPUT_SIZE]).unwrap();
        assert!((output - expected).abs() < 1e-6);
    }

    #[test]
    fn test_nan_propagates_through_relu() {
        assert!(Activation::Relu.apply(f32::NAN).is_nan());
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert_eq!(Activation::Relu.apply(2.0), 2.0);

        let spec = SequentialSpec {
            layers: vec![
                LayerSpec {
                    weight: vec![vec![1.0]],
                    bias: vec![0.0],
                    activation: Activation::Relu,
                },
                LayerSpec {
                    weight: vec![vec![1.0]],
                    bias: vec![0.0],
                    activation: Activation::Sigmoid,
                },
            ],
        };
        let net = FeedForward::from_spec(spec).unwrap();
        assert!(net.forward(&[f32::NAN]).unwrap().is_nan());
        assert_eq!(net.forward(&[-1.0]).unwrap(), 0.5);
    }

    #[test]
    fn test_nan_feature_gives_nan_probability() {
        let net = FeedForward::from_state_dict(&constant_state_dict(0.01)).unwrap();
        let mut features = [1.0; INPUT_SIZE];
        features[0] = f32::NAN;
        assert!(net.forward(&features).unwrap().is_nan());
    }

    #[test]
    fn test_strict_binding() {
        let mut state = constant_state_dict(0.0);
        state.get_mut("fc2.weight").unwrap().shape = vec![32, 63];
        let err = FeedForward::from_state_dict(&state).unwrap_err();
        assert!(err.contains("size mismatch for fc2.weight"));

        let mut state = constant_state_dict(0.0);
        state.remove("fc3.bias");
        let err = FeedForward::from_state_dict(&state).unwrap_err();
        assert!(err.contains("missing key 'fc3.bias'"));

        let mut state = constant_state_dict(0.0);
        state.insert(
            "fc4.weight".to_string(),
            ParamTensor {
                shape: vec![1],
                data: vec![0.0],
            },
        );
        let err = FeedForward::from_state_dict(&state).unwrap_err();
        assert!(err.contains("unexpected key(s) in state dict: fc4.weight"));
    }

    #[test]
    fn test_from_spec() {
        let spec = SequentialSpec {
            layers: vec![
                LayerSpec {
                    weight: vec![vec![1.0, -1.0], vec![0.5, 0.5]],
                    bias: vec![0.0, 0.0],
                    activation: Activation::Relu,
                },
                LayerSpec {
                    weight: vec![vec![1.0, 1.0]],
                    bias: vec![-1.0],
                    activation: Activation::Identity,
                },
            ],
        };
        let net = FeedForward::from_spec(spec).unwrap();

        // relu([3 - 1, 1.5 + 0.5]) = [2, 2]; 2 + 2 - 1 = 3
        assert_eq!(net.forward(&[3.0, 1.0]).unwrap(), 3.0);
        assert!(matches!(
            net.forward(&[1.0]),
            Err(InferenceError::FeatureCount { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_from_spec_rejects_bad_chain() {
        let spec = SequentialSpec {
            layers: vec![LayerSpec {
                weight: vec![vec![1.0], vec![1.0]],
                bias: vec![0.0, 0.0],
                activation: Activation::Sigmoid,
            }],
        };
        assert!(FeedForward::from_spec(spec).is_err());
    }

    #[test]
    fn test_state_dict_markers() {
        assert!(is_state_dict(["fc1.bias"].into_iter()));
        assert!(!is_state_dict(["layers"].into_iter()));
    }
}
