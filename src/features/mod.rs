//! Feature derivation for both prediction stages.
//!
//! Every builder works on a single request and keeps no state: scaling is
//! refitted to the request's own row each time, so the same raw input
//! always yields the same features.

pub mod default;
pub mod purpose;
pub mod scaling;
pub mod score;

pub use default::{DefaultFeatureBuilder, DEFAULT_FEATURE_COUNT};
pub use purpose::map_loan_purpose;
pub use score::{ScoreFeatureBuilder, SCORE_FEATURE_COUNT};
