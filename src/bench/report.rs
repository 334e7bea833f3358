//! Report generation for benchmark results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::{BenchmarkResult, OverheadReport, RunMode};
use super::runner::CleanupReport;

/// Complete A/B benchmark report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub started_at: DateTime<Utc>,
    pub workload: String,
    pub without_logging: RunSummary,
    /// Absent when logging was disabled or the logged run aborted
    pub with_logging: Option<RunSummary>,
    pub overhead: Option<OverheadSummary>,
    /// Why the logged run produced no numbers
    pub logging_error: Option<String>,
    /// Teardown problems of the logged run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup_problems: Vec<String>,
}

/// Aggregates of a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub iterations: usize,
    pub total_seconds: f64,
    /// `null` for an empty run
    pub avg_seconds_per_iteration: Option<f64>,
    pub workload_seconds: f64,
    pub fallbacks: usize,
}

/// Logged minus unlogged, in aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverheadSummary {
    pub total_seconds: f64,
    pub avg_seconds_per_iteration: Option<f64>,
    pub percent: Option<f64>,
}

impl From<&BenchmarkResult> for RunSummary {
    fn from(result: &BenchmarkResult) -> Self {
        Self {
            mode: result.mode(),
            iterations: result.iterations(),
            total_seconds: result.total_seconds(),
            avg_seconds_per_iteration: result.mean_seconds(),
            workload_seconds: result.workload_seconds(),
            fallbacks: result.fallback_count(),
        }
    }
}

impl BenchmarkReport {
    /// Start a report from the unlogged run
    pub fn new(workload: impl Into<String>, without: &BenchmarkResult) -> Self {
        Self {
            started_at: Utc::now(),
            workload: workload.into(),
            without_logging: RunSummary::from(without),
            with_logging: None,
            overhead: None,
            logging_error: None,
            cleanup_problems: Vec::new(),
        }
    }

    /// Attach the logged run and its overhead against the unlogged one
    pub fn with_logged_run(
        mut self,
        with: &BenchmarkResult,
        without: &BenchmarkResult,
        overhead: &OverheadReport,
        cleanup: &CleanupReport,
    ) -> Self {
        self.with_logging = Some(RunSummary::from(with));
        self.overhead = Some(OverheadSummary {
            total_seconds: overhead.total_delta_seconds,
            avg_seconds_per_iteration: overhead.mean_delta_seconds,
            percent: overhead.percent_of(without),
        });
        self.cleanup_problems = cleanup.problems.clone();
        self
    }

    /// Record teardown problems of a run that produced no numbers
    pub fn with_cleanup(mut self, cleanup: &CleanupReport) -> Self {
        self.cleanup_problems = cleanup.problems.clone();
        self
    }

    /// Record why the logged run has no numbers
    pub fn with_logging_error(mut self, error: impl ToString) -> Self {
        self.logging_error = Some(error.to_string());
        self
    }

    /// Print the report as an ASCII table
    pub fn print_table(&self) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════════════════╗");
        println!("║                     EVENT LOGGING OVERHEAD BENCHMARK                     ║");
        println!("╚══════════════════════════════════════════════════════════════════════════╝");
        println!();
        println!("Workload: {}   Started: {}", self.workload, self.started_at.to_rfc3339());
        println!();
        println!("┌─────────────────┬────────────┬────────────┬────────────┬────────────┬───────────┐");
        println!("│ Mode            │ Iterations │  Total(s)  │  Avg(s)    │ Workload(s)│ Fallbacks │");
        println!("├─────────────────┼────────────┼────────────┼────────────┼────────────┼───────────┤");

        for run in std::iter::once(&self.without_logging).chain(self.with_logging.as_ref()) {
            println!(
                "│ {:<15} │ {:>10} │ {:>10.4} │ {:>10} │ {:>10.4} │ {:>9} │",
                run.mode.to_string(),
                run.iterations,
                run.total_seconds,
                fmt_opt(run.avg_seconds_per_iteration, 4),
                run.workload_seconds,
                run.fallbacks
            );
        }

        println!("└─────────────────┴────────────┴────────────┴────────────┴────────────┴───────────┘");
        println!();

        match (&self.overhead, &self.logging_error) {
            (Some(overhead), _) => println!(
                "Logging overhead: {:+.4}s total, {}s per iteration ({}%)",
                overhead.total_seconds,
                fmt_opt(overhead.avg_seconds_per_iteration, 4),
                fmt_opt(overhead.percent, 1)
            ),
            (None, Some(error)) => println!("Logged run unavailable: {}", error),
            (None, None) => println!("Logging disabled"),
        }

        for problem in &self.cleanup_problems {
            println!("Cleanup problem: {}", problem);
        }
        println!();
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "n/a".to_string(),
    }
}
