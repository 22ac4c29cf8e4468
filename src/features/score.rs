//! Stage 1 features for the credit score regressor.
//!
//! The raw request is laid out as the nine-column training table, the five
//! monetary/rate columns are L2-normalized against each other, and two
//! engineered ratios replace the raw DTI, rate, amount and income columns.

use crate::error::FeatureError;
use crate::features::purpose::{map_loan_purpose, OTHER_PURPOSE};
use crate::features::scaling::normalize_rows;
use crate::types::application::dti_ratio;
use crate::types::LoanApplication;
use ndarray::array;

/// Added inside both logarithms so a zero product does not yield -inf.
pub const LOG_EPSILON: f64 = 1e-10;

/// Exponent applied to the absolute log amount/income ratio.
pub const RATIO_EXPONENT: f64 = 0.30;

pub const SCORE_FEATURE_COUNT: usize = 6;

/// Columns that are L2-normalized together, in row order.
pub const NORMALIZED_COLUMNS: [&str; 5] =
    ["Income", "LoanAmount", "CreditScore", "InterestRate", "DTIRatio"];

/// Stage 1 feature names, in model input order.
pub const SCORE_FEATURE_NAMES: [&str; SCORE_FEATURE_COUNT] = [
    "Age",
    "LoanPurpose",
    "HasMortgage",
    "HasDependents",
    "DTIRatio*InterestRate",
    "LoanAmount/Income",
];

/// One request laid out as the training table. `credit_score` is always 0
/// here; it only takes part in normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRow {
    pub loan_amount: f64,
    pub income: f64,
    pub interest_rate: f64,
    pub dti_ratio: f64,
    pub age: f64,
    pub loan_purpose: f64,
    pub has_mortgage: f64,
    pub has_dependents: f64,
    pub credit_score: f64,
}

/// Builds the six-feature vector consumed by the score model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreFeatureBuilder;

impl ScoreFeatureBuilder {
    /// Create a new stage 1 feature builder
    pub fn new() -> Self {
        Self
    }

    /// Read and coerce the raw stage 1 fields.
    pub fn raw_row(&self, app: &LoanApplication) -> Result<ScoreRow, FeatureError> {
        let income = app.number("income")?;
        let dti_ratio = dti_ratio(app.existing_debt_payment()?, income);
        let loan_amount = app.number("loanAmount")?;
        let interest_rate = app.number("loanRate")?;
        let age = app.number("age")?;
        let loan_purpose = app
            .loan_purpose()?
            .map(map_loan_purpose)
            .unwrap_or(OTHER_PURPOSE);
        let has_mortgage = app.flag("hasMortgage")?;
        let has_dependents = app.flag("hasDependents")?;

        Ok(ScoreRow {
            loan_amount,
            income,
            interest_rate,
            dti_ratio,
            age,
            loan_purpose: f64::from(loan_purpose),
            has_mortgage: if has_mortgage { 1.0 } else { 0.0 },
            has_dependents: if has_dependents { 1.0 } else { 0.0 },
            credit_score: 0.0,
        })
    }

    /// Derive the model input from an already-read row.
    ///
    /// Fails when any normalized column is NaN or infinite.
    pub fn derive(&self, row: &ScoreRow) -> Result<[f64; SCORE_FEATURE_COUNT], FeatureError> {
        let mut numeric = array![[
            row.income,
            row.loan_amount,
            row.credit_score,
            row.interest_rate,
            row.dti_ratio,
        ]];
        normalize_rows(&mut numeric, &NORMALIZED_COLUMNS)?;

        let income = numeric[[0, 0]];
        let loan_amount = numeric[[0, 1]];
        let interest_rate = numeric[[0, 3]];
        let dti_ratio = numeric[[0, 4]];

        let dti_x_rate = (dti_ratio * interest_rate + LOG_EPSILON).ln();
        let amount_over_income = (loan_amount / income + LOG_EPSILON)
            .ln()
            .abs()
            .powf(RATIO_EXPONENT);

        Ok([
            row.age,
            row.loan_purpose,
            row.has_mortgage,
            row.has_dependents,
            dti_x_rate,
            amount_over_income,
        ])
    }

    /// Read, normalize and derive in one step.
    pub fn build(&self, app: &LoanApplication) -> Result<[f64; SCORE_FEATURE_COUNT], FeatureError> {
        let row = self.raw_row(app)?;
        self.derive(&row)
    }

    /// Number of features produced
    pub fn feature_count(&self) -> usize {
        SCORE_FEATURE_COUNT
    }

    /// Feature names, in model input order
    pub fn feature_names(&self) -> &'static [&'static str] {
        &SCORE_FEATURE_NAMES
    }
}
