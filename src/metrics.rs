//! Per-request stage timings.

use crate::error::Stage;
use std::time::{Duration, Instant};
use tracing::debug;

/// Wall-clock time spent in each prediction stage of one request.
#[derive(Debug, Clone)]
pub struct StageTimings {
    start_time: Instant,
    credit_score: Option<Duration>,
    default: Option<Duration>,
}

impl StageTimings {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
            credit_score: None,
            default: None,
        }
    }

    /// Run `f` and record its duration against `stage`.
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        let elapsed = started.elapsed();
        match stage {
            Stage::CreditScore => self.credit_score = Some(elapsed),
            Stage::Default => self.default = Some(elapsed),
        }
        result
    }

    pub fn stage(&self, stage: Stage) -> Option<Duration> {
        match stage {
            Stage::CreditScore => self.credit_score,
            Stage::Default => self.default,
        }
    }

    pub fn total(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Emit the timings as one structured event.
    pub fn report(&self) {
        debug!(
            credit_score_us = self.credit_score.map(|d| d.as_micros() as u64),
            default_us = self.default.map(|d| d.as_micros() as u64),
            total_us = self.total().as_micros() as u64,
            "Stage timings"
        );
    }
}
