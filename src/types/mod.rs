//! Type definitions for the credit risk pipeline

pub mod application;
pub mod request;
pub mod response;

pub use application::LoanApplication;
pub use request::Request;
pub use response::{Prediction, PredictionResult};
