//! Per-iteration timing and the aggregates derived from it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::HarnessError;

/// Which side of the A/B comparison a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    WithLogging,
    WithoutLogging,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::WithLogging => write!(f, "with_logging"),
            RunMode::WithoutLogging => write!(f, "without_logging"),
        }
    }
}

/// Timing of one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationSample {
    /// 1-based iteration index
    pub iteration: usize,
    /// Whole timed region (workload call plus append, when logging)
    pub elapsed: Duration,
    /// Workload call alone
    pub workload_elapsed: Duration,
    /// The fallback output replaced a failed workload call
    pub fell_back: bool,
}

/// Ordered samples of one run plus their aggregates
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    mode: RunMode,
    samples: Vec<IterationSample>,
}

impl BenchmarkResult {
    /// Largest up-front reservation; longer runs grow on demand
    pub const MAX_RESERVED: usize = 1024;

    pub fn new(mode: RunMode) -> Self {
        Self::with_capacity(mode, 0)
    }

    /// Reserve room for `capacity` samples, up to [`Self::MAX_RESERVED`]
    pub fn with_capacity(mode: RunMode, capacity: usize) -> Self {
        Self {
            mode,
            samples: Vec::with_capacity(capacity.min(Self::MAX_RESERVED)),
        }
    }

    /// Record the next iteration
    pub fn push(&mut self, sample: IterationSample) {
        self.samples.push(sample);
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn samples(&self) -> &[IterationSample] {
        &self.samples
    }

    pub fn iterations(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Per-iteration durations in iteration order
    pub fn durations(&self) -> Vec<Duration> {
        self.samples.iter().map(|s| s.elapsed).collect()
    }

    /// Sum of all iteration durations; zero for an empty run
    pub fn total(&self) -> Duration {
        self.samples.iter().map(|s| s.elapsed).sum()
    }

    /// Mean iteration duration, `None` when there is no data
    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.total().div_f64(self.samples.len() as f64))
    }

    pub fn total_seconds(&self) -> f64 {
        self.samples.iter().map(|s| s.elapsed.as_secs_f64()).sum()
    }

    pub fn mean_seconds(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.total_seconds() / self.samples.len() as f64)
    }

    /// Time spent inside workload calls only
    pub fn workload_seconds(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.workload_elapsed.as_secs_f64())
            .sum()
    }

    /// Iterations that used the fallback output
    pub fn fallback_count(&self) -> usize {
        self.samples.iter().filter(|s| s.fell_back).count()
    }
}

/// Difference between a logged and an unlogged run, `with - without`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverheadReport {
    pub iterations: usize,
    /// Elementwise delta per iteration, in seconds
    pub per_iteration_seconds: Vec<f64>,
    pub total_delta_seconds: f64,
    /// `None` when both runs are empty
    pub mean_delta_seconds: Option<f64>,
}

impl OverheadReport {
    /// Relative overhead of the logged run, in percent of the unlogged total
    pub fn percent_of(&self, without: &BenchmarkResult) -> Option<f64> {
        let base = without.total_seconds();
        if base > 0.0 {
            Some(self.total_delta_seconds / base * 100.0)
        } else {
            None
        }
    }
}

/// Subtract `without` from `with`, elementwise and in aggregate
pub fn compute_overhead(
    with: &BenchmarkResult,
    without: &BenchmarkResult,
) -> Result<OverheadReport, HarnessError> {
    if with.iterations() != without.iterations() {
        return Err(HarnessError::IterationMismatch {
            with_logging: with.iterations(),
            without_logging: without.iterations(),
        });
    }

    let per_iteration_seconds = with
        .samples()
        .iter()
        .zip(without.samples())
        .map(|(w, wo)| w.elapsed.as_secs_f64() - wo.elapsed.as_secs_f64())
        .collect();

    let mean_delta_seconds = match (with.mean_seconds(), without.mean_seconds()) {
        (Some(w), Some(wo)) => Some(w - wo),
        _ => None,
    };

    Ok(OverheadReport {
        iterations: with.iterations(),
        per_iteration_seconds,
        total_delta_seconds: with.total_seconds() - without.total_seconds(),
        mean_delta_seconds,
    })
}
