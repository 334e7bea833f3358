//! A/B benchmark of a workload with and without event logging.
//!
//! This module provides:
//! - Sequential benchmark harness with pacing and bounded waits
//! - Per-iteration timing and overhead computation
//! - Mock LLM server for offline runs
//! - Report generation

pub mod config;
pub mod metrics;
pub mod mock_server;
pub mod report;
pub mod runner;

pub use config::{
    HarnessConfig, MockServerConfig, PayloadFormat, PromptSource, StreamTarget, FALLBACK_OUTPUT,
};
pub use metrics::{compute_overhead, BenchmarkResult, IterationSample, OverheadReport, RunMode};
pub use mock_server::MockLlmServer;
pub use report::{BenchmarkReport, RunSummary};
pub use runner::{BenchmarkHarness, CleanupReport, LoggedRun};
