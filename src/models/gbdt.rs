//! LightGBM model in its native text format.
//!
//! Supports single-output boosted ensembles with numerical and categorical
//! splits, LightGBM's missing-value routing, `average_output` (random forest
//! mode) and the common output transforms. Linear trees and multi-class
//! models are rejected when the file is parsed.
//!
//! The text format stores each tree as parallel arrays; they are turned into
//! a [`Tree`] of [`Node`]s once at load time so prediction is a plain walk:
//!
//! ```
//! use credit_risk_pipeline::models::gbdt::{Child, GbdtModel, Node, OutputTransform, Tree};
//!
//! let tree = Tree::new(
//!     vec![Node::numerical(0, 50.0, Child::Leaf(0), Child::Leaf(1))],
//!     vec![100.0, 200.0],
//! );
//! let model = GbdtModel::new(vec![tree], 1, OutputTransform::Identity).unwrap();
//! assert_eq!(model.predict(&[30.0]).unwrap(), 100.0);
//! ```

use crate::error::InferenceError;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

const CATEGORICAL_MASK: u8 = 1;
const DEFAULT_LEFT_MASK: u8 = 2;

/// Values within this distance of zero count as missing for
/// [`MissingType::Zero`] splits.
const ZERO_THRESHOLD: f64 = 1e-35;

#[derive(Debug, Error, PartialEq)]
pub enum GbdtParseError {
    #[error("not a LightGBM text model (expected 'tree' header)")]
    MissingHeader,

    #[error("missing key '{key}' in {section}")]
    MissingKey { section: String, key: &'static str },

    #[error("invalid value for '{key}' in {section}: {value}")]
    InvalidValue {
        section: String,
        key: &'static str,
        value: String,
    },

    #[error("{section}: {reason}")]
    Malformed { section: String, reason: String },

    #[error("unsupported model: {0}")]
    Unsupported(String),

    #[error("model contains no trees")]
    NoTrees,
}

/// Transform applied to the summed raw score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputTransform {
    Identity,
    /// `sign(x) * x^2`, for regressors trained on a square-rooted label.
    SignedSquare,
    Exp,
    Sigmoid(f64),
}

impl OutputTransform {
    fn from_objective(objective: &str) -> Result<Self, GbdtParseError> {
        let mut parts = objective.split_whitespace();
        let name = parts.next().unwrap_or("regression");

        match name {
            "regression" | "regression_l2" | "regression_l1" | "l2" | "l1" | "mse" | "mae"
            | "huber" | "fair" | "quantile" | "mape" => {
                if parts.any(|p| p == "sqrt") {
                    Ok(OutputTransform::SignedSquare)
                } else {
                    Ok(OutputTransform::Identity)
                }
            }
            "poisson" | "gamma" | "tweedie" => Ok(OutputTransform::Exp),
            "binary" => {
                let sigmoid = parts
                    .find_map(|p| p.strip_prefix("sigmoid:"))
                    .map(|v| v.parse::<f64>())
                    .transpose()
                    .map_err(|_| GbdtParseError::InvalidValue {
                        section: "header".to_string(),
                        key: "objective",
                        value: objective.to_string(),
                    })?
                    .unwrap_or(1.0);
                Ok(OutputTransform::Sigmoid(sigmoid))
            }
            other => Err(GbdtParseError::Unsupported(format!("objective '{other}'"))),
        }
    }

    fn apply(self, raw: f64) -> f64 {
        match self {
            OutputTransform::Identity => raw,
            OutputTransform::SignedSquare => raw.signum() * raw * raw,
            OutputTransform::Exp => raw.exp(),
            OutputTransform::Sigmoid(sigmoid) => 1.0 / (1.0 + (-sigmoid * raw).exp()),
        }
    }
}

/// Which feature values a numerical split treats as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingType {
    None,
    Zero,
    NaN,
}

/// Test applied at an internal node.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// `value <= threshold` goes left; missing values follow `default_left`.
    Numerical {
        threshold: f64,
        missing: MissingType,
        default_left: bool,
    },
    /// Categories whose bit is set go left.
    Categorical { bitset: Vec<u32> },
}

/// Edge out of an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Node(usize),
    Leaf(usize),
}

/// Internal node of a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub feature: usize,
    pub decision: Decision,
    pub left: Child,
    pub right: Child,
}

impl Node {
    /// Numerical split with no missing-value handling.
    pub fn numerical(feature: usize, threshold: f64, left: Child, right: Child) -> Self {
        Self {
            feature,
            decision: Decision::Numerical {
                threshold,
                missing: MissingType::None,
                default_left: false,
            },
            left,
            right,
        }
    }

    /// Categorical split sending `categories` left.
    pub fn categorical(feature: usize, categories: &[u32], left: Child, right: Child) -> Self {
        let words = categories.iter().map(|&c| c as usize / 32 + 1).max().unwrap_or(0);
        let mut bitset = vec![0_u32; words];
        for &category in categories {
            bitset[category as usize / 32] |= 1 << (category % 32);
        }
        Self {
            feature,
            decision: Decision::Categorical { bitset },
            left,
            right,
        }
    }

    /// Set how a numerical split routes missing values.
    pub fn with_missing(mut self, missing_type: MissingType, left: bool) -> Self {
        if let Decision::Numerical {
            missing,
            default_left,
            ..
        } = &mut self.decision
        {
            *missing = missing_type;
            *default_left = left;
        }
        self
    }

    fn next(&self, fval: f64) -> Child {
        let goes_left = match &self.decision {
            Decision::Numerical {
                threshold,
                missing,
                default_left,
            } => {
                let fval = if fval.is_nan() && *missing != MissingType::NaN {
                    0.0
                } else {
                    fval
                };
                let is_missing = match missing {
                    MissingType::None => false,
                    MissingType::Zero => (-ZERO_THRESHOLD..=ZERO_THRESHOLD).contains(&fval),
                    MissingType::NaN => fval.is_nan(),
                };
                if is_missing {
                    *default_left
                } else {
                    fval <= *threshold
                }
            }
            Decision::Categorical { bitset } => {
                // Categories are compared after truncation to an integer.
                let category = fval as i64;
                if fval.is_nan() || category < 0 {
                    false
                } else {
                    let word = (category / 32) as usize;
                    word < bitset.len() && (bitset[word] >> (category % 32)) & 1 == 1
                }
            }
        };

        if goes_left {
            self.left
        } else {
            self.right
        }
    }
}

/// One regression tree. A tree without internal nodes is a single leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    leaves: Vec<f64>,
}

impl Tree {
    /// Create a tree; the root is `nodes[0]`, or `leaves[0]` when there
    /// are no internal nodes.
    pub fn new(nodes: Vec<Node>, leaves: Vec<f64>) -> Self {
        Self { nodes, leaves }
    }

    /// Number of leaves.
    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }

    fn leaf_output(&self, row: &[f64]) -> f64 {
        let mut child = if self.nodes.is_empty() {
            Child::Leaf(0)
        } else {
            Child::Node(0)
        };
        loop {
            match child {
                Child::Leaf(leaf) => return self.leaves[leaf],
                Child::Node(index) => {
                    let node = &self.nodes[index];
                    child = node.next(row[node.feature]);
                }
            }
        }
    }

    /// Reject trees whose indices would panic or loop during traversal.
    fn validate(&self, num_features: usize) -> Result<(), String> {
        if self.leaves.len() != self.nodes.len() + 1 {
            return Err(format!(
                "{} internal nodes need {} leaves, found {}",
                self.nodes.len(),
                self.nodes.len() + 1,
                self.leaves.len()
            ));
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if node.feature >= num_features {
                return Err(format!(
                    "split on feature {}, model has {num_features}",
                    node.feature
                ));
            }
            for child in [node.left, node.right] {
                let valid = match child {
                    Child::Leaf(leaf) => leaf < self.leaves.len(),
                    // Internal children are always created after their parent.
                    Child::Node(next) => next > index && next < self.nodes.len(),
                };
                if !valid {
                    return Err(format!("node {index} has invalid child {child:?}"));
                }
            }
        }
        Ok(())
    }
}

/// A loaded LightGBM ensemble.
#[derive(Debug, Clone)]
pub struct GbdtModel {
    trees: Vec<Tree>,
    num_features: usize,
    feature_names: Vec<String>,
    average_output: bool,
    transform: OutputTransform,
}

impl GbdtModel {
    /// Create a model from already-built trees, checking every tree.
    pub fn new(
        trees: Vec<Tree>,
        num_features: usize,
        transform: OutputTransform,
    ) -> Result<Self, GbdtParseError> {
        if trees.is_empty() {
            return Err(GbdtParseError::NoTrees);
        }
        for (index, tree) in trees.iter().enumerate() {
            tree.validate(num_features)
                .map_err(|reason| GbdtParseError::Malformed {
                    section: format!("Tree={index}"),
                    reason,
                })?;
        }

        Ok(Self {
            trees,
            num_features,
            feature_names: Vec::new(),
            average_output: false,
            transform,
        })
    }

    /// Parse a model saved with LightGBM's `save_model`.
    pub fn from_text(text: &str) -> Result<Self, GbdtParseError> {
        let mut lines = text.lines().map(str::trim);

        if lines.by_ref().find(|l| !l.is_empty()) != Some("tree") {
            return Err(GbdtParseError::MissingHeader);
        }

        let mut header = Section::new("header");
        let mut blocks: Vec<Section> = Vec::new();

        for line in lines {
            if line == "end of trees" {
                break;
            }
            if let Some(index) = line.strip_prefix("Tree=") {
                blocks.push(Section::new(format!("Tree={index}")));
                continue;
            }
            if line.is_empty() {
                continue;
            }
            match blocks.last_mut() {
                Some(block) => block.insert(line),
                None => header.insert(line),
            }
        }

        let num_class: usize = header.parse_or("num_class", 1)?;
        let per_iteration: usize = header.parse_or("num_tree_per_iteration", 1)?;
        if num_class != 1 || per_iteration != 1 {
            return Err(GbdtParseError::Unsupported(format!(
                "{num_class} classes, {per_iteration} trees per iteration"
            )));
        }

        let max_feature_idx: usize = header.parse("max_feature_idx")?;
        let transform = OutputTransform::from_objective(header.raw("objective").unwrap_or(""))?;

        let trees = blocks
            .iter()
            .map(Section::to_tree)
            .collect::<Result<Vec<_>, _>>()?;

        let mut model = Self::new(trees, max_feature_idx + 1, transform)?;
        model.feature_names = header
            .raw("feature_names")
            .map(|names| names.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        model.average_output = header.has_flag("average_output");
        Ok(model)
    }

    /// Predict one row; `row.len()` must equal [`Self::num_features`].
    pub fn predict(&self, row: &[f64]) -> Result<f64, InferenceError> {
        if row.len() != self.num_features {
            return Err(InferenceError::FeatureCount {
                expected: self.num_features,
                actual: row.len(),
            });
        }

        let mut raw: f64 = self.trees.iter().map(|tree| tree.leaf_output(row)).sum();
        if self.average_output {
            raw /= self.trees.len() as f64;
        }
        Ok(self.transform.apply(raw))
    }

    /// Number of input features
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Number of trees in the ensemble
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Feature names recorded at training time, if any
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn transform(&self) -> OutputTransform {
        self.transform
    }
}

/// `key=value` lines of one header or tree block. Bare lines are flags.
struct Section {
    name: String,
    values: HashMap<String, String>,
    flags: Vec<String>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
            flags: Vec::new(),
        }
    }

    fn insert(&mut self, line: &str) {
        match line.split_once('=') {
            Some((key, value)) => {
                self.values.insert(key.to_string(), value.to_string());
            }
            None => self.flags.push(line.to_string()),
        }
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    fn invalid(&self, key: &'static str, value: &str) -> GbdtParseError {
        GbdtParseError::InvalidValue {
            section: self.name.clone(),
            key,
            value: value.to_string(),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> GbdtParseError {
        GbdtParseError::Malformed {
            section: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn missing(&self, key: &'static str) -> GbdtParseError {
        GbdtParseError::MissingKey {
            section: self.name.clone(),
            key,
        }
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> Result<T, GbdtParseError> {
        let value = self.raw(key).ok_or_else(|| self.missing(key))?;
        value.parse().map_err(|_| self.invalid(key, value))
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, GbdtParseError> {
        match self.raw(key) {
            Some(_) => self.parse(key),
            None => Ok(default),
        }
    }

    /// Whitespace-separated list of any length.
    fn parse_items<T: FromStr>(&self, key: &'static str) -> Result<Vec<T>, GbdtParseError> {
        let value = self.raw(key).ok_or_else(|| self.missing(key))?;
        value
            .split_whitespace()
            .map(|item| item.parse::<T>().map_err(|_| self.invalid(key, item)))
            .collect()
    }

    /// Whitespace-separated list of exactly `len` values.
    fn parse_list<T: FromStr>(
        &self,
        key: &'static str,
        len: usize,
    ) -> Result<Vec<T>, GbdtParseError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let items = self.parse_items(key)?;
        if items.len() != len {
            return Err(self.malformed(format!(
                "'{key}' has {} values, expected {len}",
                items.len()
            )));
        }
        Ok(items)
    }

    /// Convert the parallel arrays of one tree block into a [`Tree`].
    fn to_tree(&self) -> Result<Tree, GbdtParseError> {
        if self.parse_or("is_linear", 0_u8)? != 0 {
            return Err(GbdtParseError::Unsupported(format!(
                "linear tree in {}",
                self.name
            )));
        }

        let num_leaves: usize = self.parse("num_leaves")?;
        if num_leaves == 0 {
            return Err(self.malformed("num_leaves is 0"));
        }
        let internal = num_leaves - 1;
        let num_cat: usize = self.parse_or("num_cat", 0)?;

        let split_feature: Vec<usize> = self.parse_list("split_feature", internal)?;
        let threshold: Vec<f64> = self.parse_list("threshold", internal)?;
        let decision_type: Vec<u8> = self.parse_list("decision_type", internal)?;
        let left_child: Vec<i32> = self.parse_list("left_child", internal)?;
        let right_child: Vec<i32> = self.parse_list("right_child", internal)?;
        let leaf_value: Vec<f64> = self.parse_list("leaf_value", num_leaves)?;

        let (cat_boundaries, cat_threshold): (Vec<usize>, Vec<u32>) = if num_cat > 0 {
            (
                self.parse_list("cat_boundaries", num_cat + 1)?,
                self.parse_items("cat_threshold")?,
            )
        } else {
            (Vec::new(), Vec::new())
        };
        if !cat_boundaries.windows(2).all(|w| w[0] <= w[1])
            || cat_boundaries
                .last()
                .is_some_and(|&end| end > cat_threshold.len())
        {
            return Err(self.malformed("cat_boundaries out of range"));
        }

        let child = |raw: i32| {
            if raw < 0 {
                Child::Leaf(!raw as usize)
            } else {
                Child::Node(raw as usize)
            }
        };

        let mut nodes = Vec::with_capacity(internal);
        for n in 0..internal {
            let decision = decision_type[n];
            let (left, right) = (child(left_child[n]), child(right_child[n]));

            let node = if decision & CATEGORICAL_MASK != 0 {
                let set = threshold[n];
                if set < 0.0 || set as usize >= num_cat {
                    return Err(self.malformed(format!(
                        "node {n} references category set {set}"
                    )));
                }
                let set = set as usize;
                Node {
                    feature: split_feature[n],
                    decision: Decision::Categorical {
                        bitset: cat_threshold[cat_boundaries[set]..cat_boundaries[set + 1]]
                            .to_vec(),
                    },
                    left,
                    right,
                }
            } else {
                let missing = match (decision >> 2) & 3 {
                    0 => MissingType::None,
                    1 => MissingType::Zero,
                    2 => MissingType::NaN,
                    other => {
                        return Err(self.malformed(format!(
                            "node {n} has unknown missing type {other}"
                        )))
                    }
                };
                Node::numerical(split_feature[n], threshold[n], left, right)
                    .with_missing(missing, decision & DEFAULT_LEFT_MASK != 0)
            };
            nodes.push(node);
        }

        Ok(Tree::new(nodes, leaf_value))
    }
}
