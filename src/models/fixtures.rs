//! Synthetic model artifacts.
//!
//! Random-weight stand-ins for the trained models, in the same on-disk
//! formats, so the pipeline can run end to end without the training
//! pipeline. Used by the `make-fixture-models` tool and by tests.

use crate::features::score::SCORE_FEATURE_NAMES;
use crate::models::loader::ModelPaths;
use crate::models::network::{ParamTensor, StateDict, HIDDEN_SIZES, INPUT_SIZE, OUTPUT_SIZE};
use rand::Rng;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensorError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::info;

/// Plausible split ranges for each stage 1 feature.
const SPLIT_RANGES: [(f64, f64); 6] = [
    (18.0, 80.0),
    (0.0, 4.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (-30.0, -10.0),
    (0.3, 1.5),
];

const BASE_SCORE: f64 = 650.0;

/// Canonical-architecture state dict with uniform `±1/sqrt(fan_in)` weights.
pub fn random_state_dict<R: Rng + ?Sized>(rng: &mut R) -> StateDict {
    let sizes = [INPUT_SIZE, HIDDEN_SIZES[0], HIDDEN_SIZES[1], OUTPUT_SIZE];
    let mut state = StateDict::new();

    for layer in 0..3 {
        let (fan_in, fan_out) = (sizes[layer], sizes[layer + 1]);
        let bound = 1.0 / (fan_in as f32).sqrt();
        let mut sample =
            |n: usize| -> Vec<f32> { (0..n).map(|_| rng.gen_range(-bound..bound)).collect() };

        state.insert(
            format!("fc{}.weight", layer + 1),
            ParamTensor {
                shape: vec![fan_out, fan_in],
                data: sample(fan_out * fan_in),
            },
        );
        state.insert(
            format!("fc{}.bias", layer + 1),
            ParamTensor {
                shape: vec![fan_out],
                data: sample(fan_out),
            },
        );
    }
    state
}

/// Serialize a state dict as a little-endian f32 safetensors archive.
pub fn state_dict_to_safetensors(state: &StateDict) -> Result<Vec<u8>, SafeTensorError> {
    let buffers: Vec<(&String, &ParamTensor, Vec<u8>)> = state
        .iter()
        .map(|(name, tensor)| {
            let bytes = tensor.data.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name, tensor, bytes)
        })
        .collect();

    let mut views = HashMap::with_capacity(buffers.len());
    for (name, tensor, bytes) in &buffers {
        views.insert(
            name.to_string(),
            TensorView::new(Dtype::F32, tensor.shape.clone(), bytes)?,
        );
    }
    safetensors::serialize(&views, &None)
}

/// A state dict as a JSON object of nested lists.
pub fn state_dict_to_json(state: &StateDict) -> Value {
    fn nest(shape: &[usize], data: &[f32]) -> Value {
        match shape {
            [] => Value::from(data.first().copied().unwrap_or_default()),
            [_] => Value::from(data.to_vec()),
            [rows, rest @ ..] => {
                let stride = rest.iter().product::<usize>();
                Value::Array(
                    (0..*rows)
                        .map(|r| nest(rest, &data[r * stride..(r + 1) * stride]))
                        .collect(),
                )
            }
        }
    }

    let map: Map<String, Value> = state
        .iter()
        .map(|(name, tensor)| (name.clone(), nest(&tensor.shape, &tensor.data)))
        .collect();
    Value::Object(map)
}

/// A LightGBM text model over the stage 1 features.
///
/// Every tree has three leaves; leaf values sum to roughly
/// [`BASE_SCORE`] so predictions look like credit scores. Splits send NaN
/// to the left child.
pub fn random_score_model_text<R: Rng + ?Sized>(rng: &mut R, num_trees: usize) -> String {
    let num_trees = num_trees.max(1);
    let per_tree = BASE_SCORE / num_trees as f64;
    let spread = 100.0 / num_trees as f64;

    let mut text = format!(
        "tree\nversion=v4\nnum_class=1\nnum_tree_per_iteration=1\nlabel_index=0\n\
         max_feature_idx={}\nobjective=regression\nfeature_names={}\n\n",
        SCORE_FEATURE_NAMES.len() - 1,
        SCORE_FEATURE_NAMES.join(" ")
    );

    for index in 0..num_trees {
        let features = [
            rng.gen_range(0..SPLIT_RANGES.len()),
            rng.gen_range(0..SPLIT_RANGES.len()),
        ];
        let thresholds = features.map(|f| {
            let (low, high) = SPLIT_RANGES[f];
            rng.gen_range(low..high)
        });
        let leaves: Vec<f64> = (0..3)
            .map(|_| per_tree + rng.gen_range(-spread..spread))
            .collect();

        let [f0, f1] = features;
        let [t0, t1] = thresholds;
        let (l0, l1, l2) = (leaves[0], leaves[1], leaves[2]);
        text.push_str(&format!(
            "Tree={index}\nnum_leaves=3\nnum_cat=0\nsplit_feature={f0} {f1}\n\
             split_gain=1 1\nthreshold={t0} {t1}\ndecision_type=10 10\n\
             left_child=1 -1\nright_child=-2 -3\nleaf_value={l0} {l1} {l2}\n\
             leaf_count=1 1 1\nis_linear=0\nshrinkage=1\n\n\n"
        ));
    }

    text.push_str("end of trees\n");
    text
}

/// Write both fixture artifacts into `dir` under their standard names.
pub fn write_fixture_models<R: Rng + ?Sized>(dir: &Path, rng: &mut R) -> io::Result<ModelPaths> {
    let paths = ModelPaths::under(dir);
    fs::create_dir_all(dir)?;

    fs::write(&paths.score_model, random_score_model_text(rng, 20))?;

    let archive = state_dict_to_safetensors(&random_state_dict(rng)).map_err(io::Error::other)?;
    fs::write(&paths.default_model, archive)?;

    info!(
        score_model = %paths.score_model.display(),
        default_model = %paths.default_model.display(),
        "Fixture models written"
    );
    Ok(paths)
}
