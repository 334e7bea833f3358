// Deterministic workloads for tests and offline runs

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::Workload;
use crate::error::WorkloadError;

/// Returns the input reversed, optionally after a fixed delay
#[derive(Debug, Default)]
pub struct ReverseWorkload {
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ReverseWorkload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before answering, to stand in for network latency
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Workload for ReverseWorkload {
    fn name(&self) -> &str {
        "reverse"
    }

    async fn execute(&self, input: &str) -> Result<String, WorkloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(input.chars().rev().collect())
    }
}

/// Fails every call
#[derive(Debug, Default)]
pub struct FailingWorkload {
    calls: AtomicUsize,
}

impl FailingWorkload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Workload for FailingWorkload {
    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _input: &str) -> Result<String, WorkloadError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(WorkloadError::Injected(format!("call {} always fails", n)))
    }
}

/// Reverses its input except on the listed calls (1-based), which fail
#[derive(Debug, Default)]
pub struct FlakyWorkload {
    fail_on: HashSet<usize>,
    calls: AtomicUsize,
}

impl FlakyWorkload {
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_on: calls.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Workload for FlakyWorkload {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, input: &str) -> Result<String, WorkloadError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Err(WorkloadError::Injected(format!("call {} scripted to fail", n)));
        }
        Ok(input.chars().rev().collect())
    }
}
