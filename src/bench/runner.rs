//! Sequential A/B benchmark harness.
//!
//! Iterations never overlap: each one awaits its workload call (and its
//! append, when logging) before the next one starts.

use std::time::Duration;
use tokio::time::Instant;

use super::config::{HarnessConfig, StreamTarget, FALLBACK_OUTPUT};
use super::metrics::{BenchmarkResult, IterationSample, RunMode};
use crate::error::{AppendError, HarnessError, LogError, WorkloadError};
use crate::logsvc::{AcquireOutcome, Ack, ReleaseStatus, Session, StreamHandle};
use crate::workload::Workload;

/// Outcome of session teardown after a logged run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    /// Status of the release, when one was attempted and answered
    pub release: Option<ReleaseStatus>,
    pub disconnected: bool,
    /// Human-readable description of every teardown problem
    pub problems: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// A completed logged run and how its teardown went
#[derive(Debug, Clone)]
pub struct LoggedRun {
    pub result: BenchmarkResult,
    pub cleanup: CleanupReport,
}

/// Enforces a minimum interval between iteration starts
struct Pacer {
    interval: Duration,
    last_start: Option<Instant>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: None,
        }
    }

    async fn wait(&mut self) {
        if let Some(last) = self.last_start {
            if !self.interval.is_zero() {
                match last.checked_add(self.interval) {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => tracing::warn!(
                        interval = ?self.interval,
                        "Pacing interval out of range, not waiting"
                    ),
                }
            }
        }
        self.last_start = Some(Instant::now());
    }
}

/// Benchmark harness that times a workload with and without event logging
pub struct BenchmarkHarness {
    config: HarnessConfig,
}

impl BenchmarkHarness {
    /// Create a new benchmark harness
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Time `iterations` workload calls with no logging-service interaction
    pub async fn run_without_logging(&self, workload: &dyn Workload) -> BenchmarkResult {
        let n = self.config.iterations;
        let mut result = BenchmarkResult::with_capacity(RunMode::WithoutLogging, n);
        let mut pacer = Pacer::new(self.config.pacing);

        tracing::info!(workload = workload.name(), iterations = n, "Benchmarking WITHOUT logging");

        for i in 1..=n {
            pacer.wait().await;
            let input = self.config.prompts.prompt(i);

            let start = Instant::now();
            let (_output, workload_elapsed, fell_back) = self.call_workload(workload, &input, i).await;
            let elapsed = start.elapsed();

            result.push(IterationSample {
                iteration: i,
                elapsed,
                workload_elapsed,
                fell_back,
            });
            tracing::debug!(
                iteration = i,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "Request completed"
            );
        }

        log_summary(&result);
        result
    }

    /// Time `iterations` workload calls, each followed by an append on `handle`.
    ///
    /// The append is inside the timed region. A failed append aborts the run
    /// with the failing iteration; releasing the stream is the caller's job.
    pub async fn run_with_logging(
        &self,
        workload: &dyn Workload,
        handle: &StreamHandle,
    ) -> Result<BenchmarkResult, HarnessError> {
        let n = self.config.iterations;
        let mut result = BenchmarkResult::with_capacity(RunMode::WithLogging, n);
        let mut pacer = Pacer::new(self.config.pacing);

        tracing::info!(
            workload = workload.name(),
            iterations = n,
            namespace = handle.namespace(),
            stream = handle.stream(),
            "Benchmarking WITH logging"
        );

        for i in 1..=n {
            pacer.wait().await;
            let input = self.config.prompts.prompt(i);

            let start = Instant::now();
            let (output, workload_elapsed, fell_back) = self.call_workload(workload, &input, i).await;
            let payload = self.config.payload_format.compose(&input, &output);
            let ack = self.append(handle, payload, i).await?;
            let elapsed = start.elapsed();

            result.push(IterationSample {
                iteration: i,
                elapsed,
                workload_elapsed,
                fell_back,
            });
            tracing::debug!(
                iteration = i,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                event_timestamp = ack.timestamp,
                "Request and logging completed"
            );
        }

        log_summary(&result);
        Ok(result)
    }

    /// Scoped logged run: connect, create the namespace, acquire the stream,
    /// run, then release and disconnect on every exit path.
    ///
    /// Setup failures abort before any iteration runs.
    pub async fn run_logged(
        &self,
        workload: &dyn Workload,
        session: &mut Session,
        target: &StreamTarget,
    ) -> Result<LoggedRun, HarnessError> {
        session.connect().await?;

        let handle = match acquire(session, target).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "Logging setup failed, skipping logged run");
                teardown(session, None).await;
                return Err(HarnessError::Setup(e));
            }
        };

        let outcome = self.run_with_logging(workload, &handle).await;
        drop(handle);
        let cleanup = teardown(session, Some(target)).await;

        match outcome {
            Ok(result) => Ok(LoggedRun { result, cleanup }),
            Err(HarnessError::Append {
                iteration, source, ..
            }) => Err(HarnessError::Append {
                iteration,
                source,
                cleanup: Some(cleanup),
            }),
            Err(e) => Err(e),
        }
    }

    /// Call the workload, substituting the fallback output on failure
    async fn call_workload(
        &self,
        workload: &dyn Workload,
        input: &str,
        iteration: usize,
    ) -> (String, Duration, bool) {
        let start = Instant::now();
        let outcome = match self.config.workload_timeout {
            Some(limit) => tokio::time::timeout(limit, workload.execute(input))
                .await
                .unwrap_or(Err(WorkloadError::Timeout(limit))),
            None => workload.execute(input).await,
        };
        let elapsed = start.elapsed();

        match outcome {
            Ok(output) => (output, elapsed, false),
            Err(e) => {
                tracing::warn!(
                    iteration = iteration,
                    error_kind = e.kind(),
                    error = %e,
                    "Workload failed, substituting fallback output"
                );
                (FALLBACK_OUTPUT.to_string(), elapsed, true)
            }
        }
    }

    async fn append(
        &self,
        handle: &StreamHandle,
        payload: String,
        iteration: usize,
    ) -> Result<Ack, HarnessError> {
        let outcome = match self.config.append_timeout {
            Some(limit) => tokio::time::timeout(limit, handle.append(payload))
                .await
                .unwrap_or(Err(AppendError::Timeout(limit))),
            None => handle.append(payload).await,
        };

        outcome.map_err(|source| {
            tracing::error!(
                iteration = iteration,
                namespace = handle.namespace(),
                stream = handle.stream(),
                error = %source,
                "Append failed, aborting logged run"
            );
            HarnessError::Append {
                iteration,
                source,
                cleanup: None,
            }
        })
    }
}

/// Create the namespace (existing is fine) and take the stream lease
async fn acquire(session: &mut Session, target: &StreamTarget) -> Result<StreamHandle, LogError> {
    session
        .create_namespace(&target.namespace, &target.namespace_attrs, target.flags)
        .await?;

    match session
        .acquire_stream(&target.namespace, &target.stream, &target.stream_attrs, target.flags)
        .await?
    {
        AcquireOutcome::Acquired(handle) => Ok(handle),
        AcquireOutcome::NotFound => Err(LogError::Acquisition(format!(
            "Namespace {} not found",
            target.namespace
        ))),
        AcquireOutcome::Conflict => Err(LogError::Acquisition(format!(
            "Stream {}/{} is leased by another session",
            target.namespace, target.stream
        ))),
    }
}

/// Best-effort release and disconnect; problems are reported, never raised
async fn teardown(session: &mut Session, release: Option<&StreamTarget>) -> CleanupReport {
    let mut report = CleanupReport::default();

    if let Some(target) = release {
        match session.release_stream(&target.namespace, &target.stream).await {
            Ok(ReleaseStatus::Released) => report.release = Some(ReleaseStatus::Released),
            Ok(status) => {
                report.release = Some(status);
                let e = LogError::Acquisition(format!(
                    "Release of {}/{} returned {:?}",
                    target.namespace, target.stream, status
                ));
                report.problems.push(e.to_string());
            }
            Err(e) => report.problems.push(e.to_string()),
        }
    }

    if session.is_connected() {
        match session.disconnect().await {
            Ok(()) => report.disconnected = true,
            Err(e) => report.problems.push(e.to_string()),
        }
    }

    for problem in &report.problems {
        tracing::warn!(problem = %problem, "Logging cleanup problem");
    }
    report
}

fn log_summary(result: &BenchmarkResult) {
    match result.mean_seconds() {
        Some(avg) => tracing::info!(
            mode = %result.mode(),
            iterations = result.iterations(),
            total_seconds = result.total_seconds(),
            avg_seconds = avg,
            fallbacks = result.fallback_count(),
            "Benchmark run completed"
        ),
        None => tracing::info!(mode = %result.mode(), "Benchmark run completed with no iterations"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::config::{PayloadFormat, PromptSource};
    use crate::bench::metrics::compute_overhead;
    use crate::logsvc::{
        Attributes, ClientConfig, FaultPlan, MemoryLogService, ServiceCall, SessionState,
    };
    use crate::workload::{FailingWorkload, FlakyWorkload, ReverseWorkload};
    use std::sync::Arc;

    fn harness(n: usize) -> BenchmarkHarness {
        BenchmarkHarness::new(HarnessConfig::unpaced(n))
    }

    fn session_for(service: &Arc<MemoryLogService>) -> Session {
        Session::new(ClientConfig::default(), service.clone())
    }

    #[tokio::test]
    async fn test_run_without_logging_records_every_iteration() {
        let workload = ReverseWorkload::new();
        let result = harness(4).run_without_logging(&workload).await;

        assert_eq!(result.iterations(), 4);
        assert_eq!(result.mode(), RunMode::WithoutLogging);
        assert_eq!(workload.calls(), 4);
        let indices: Vec<usize> = result.samples().iter().map(|s| s.iteration).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_zero_iterations_is_no_data() {
        let service = Arc::new(MemoryLogService::new());
        let mut session = session_for(&service);
        let workload = ReverseWorkload::new();
        let h = harness(0);

        let without = h.run_without_logging(&workload).await;
        let with = h
            .run_logged(&workload, &mut session, &StreamTarget::default())
            .await
            .unwrap()
            .result;

        assert!(without.is_empty() && with.is_empty());
        assert_eq!(without.mean_seconds(), None);
        assert_eq!(with.total_seconds(), 0.0);
        assert_eq!(workload.calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_workload_still_counts_iterations() {
        let service = Arc::new(MemoryLogService::new());
        let mut session = session_for(&service);
        let workload = FailingWorkload::new();
        let h = harness(3);

        let without = h.run_without_logging(&workload).await;
        let run = h
            .run_logged(&workload, &mut session, &StreamTarget::default())
            .await
            .unwrap();

        assert_eq!(without.iterations(), 3);
        assert_eq!(run.result.iterations(), 3);
        assert_eq!(without.fallback_count(), 3);
        assert_eq!(run.result.fallback_count(), 3);

        let events = service
            .events("bench_chronicle_llama", "bench_story_llama")
            .unwrap();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| e.payload.ends_with(FALLBACK_OUTPUT.as_bytes())));

        assert!(compute_overhead(&run.result, &without).is_ok());
    }

    #[tokio::test]
    async fn test_response_only_payload() {
        let service = Arc::new(MemoryLogService::new());
        let mut session = session_for(&service);
        let config = HarnessConfig {
            payload_format: PayloadFormat::ResponseOnly,
            prompts: PromptSource::Fixed("abc".to_string()),
            ..HarnessConfig::unpaced(2)
        };
        let target = StreamTarget::new("ns", "story");

        BenchmarkHarness::new(config)
            .run_logged(&ReverseWorkload::new(), &mut session, &target)
            .await
            .unwrap();

        let payloads: Vec<_> = service
            .events("ns", "story")
            .unwrap()
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(payloads, vec!["cba", "cba"]);
    }

    #[tokio::test]
    async fn test_fallback_payload_keeps_prompt() {
        let service = Arc::new(MemoryLogService::new());
        let mut session = session_for(&service);
        let workload = FlakyWorkload::failing_on([2]);
        let target = StreamTarget::new("ns", "story");

        let run = harness(3)
            .run_logged(&workload, &mut session, &target)
            .await
            .unwrap();

        let flags: Vec<bool> = run.result.samples().iter().map(|s| s.fell_back).collect();
        assert_eq!(flags, vec![false, true, false]);

        let events = service.events("ns", "story").unwrap();
        let second = String::from_utf8(events[1].payload.to_vec()).unwrap();
        assert_eq!(
            second,
            format!("Prompt: {}\nResponse: {}", PromptSource::Numbered.prompt(2), FALLBACK_OUTPUT)
        );
    }

    #[tokio::test]
    async fn test_append_failure_aborts_and_cleans_up() {
        let service = Arc::new(MemoryLogService::with_faults(FaultPlan {
            fail_append_at: Some(3),
            ..Default::default()
        }));
        let mut session = session_for(&service);
        let workload = ReverseWorkload::new();

        let err = harness(5)
            .run_logged(&workload, &mut session, &StreamTarget::default())
            .await
            .unwrap_err();

        assert_eq!(workload.calls(), 3);
        assert_eq!(session.state(), &SessionState::Closed);
        match err {
            HarnessError::Append {
                iteration: 3,
                cleanup: Some(cleanup),
                ..
            } => {
                assert!(cleanup.is_clean());
                assert_eq!(cleanup.release, Some(ReleaseStatus::Released));
                assert!(cleanup.disconnected);
            }
            other => panic!("expected Append at iteration 3 with cleanup, got {:?}", other),
        }

        let calls = service.calls();
        assert!(matches!(calls[calls.len() - 2], ServiceCall::ReleaseStream { .. }));
        assert!(matches!(calls[calls.len() - 1], ServiceCall::Disconnect { .. }));
    }

    #[tokio::test]
    async fn test_append_failure_carries_cleanup_problems() {
        let service = Arc::new(MemoryLogService::with_faults(FaultPlan {
            fail_append_at: Some(1),
            fail_release: true,
            ..Default::default()
        }));
        let mut session = session_for(&service);

        let err = harness(3)
            .run_logged(&ReverseWorkload::new(), &mut session, &StreamTarget::default())
            .await
            .unwrap_err();

        match err {
            HarnessError::Append {
                iteration: 1,
                cleanup: Some(cleanup),
                ..
            } => {
                assert!(!cleanup.is_clean());
                assert!(!cleanup.disconnected);
            }
            other => panic!("expected Append at iteration 1 with cleanup, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_namespace_failure_after_connect_disconnects() {
        let service = Arc::new(MemoryLogService::with_faults(FaultPlan {
            fail_create_namespace: true,
            ..Default::default()
        }));
        let mut session = session_for(&service);
        let workload = ReverseWorkload::new();

        let err = harness(4)
            .run_logged(&workload, &mut session, &StreamTarget::default())
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Setup(LogError::Acquisition(_))));
        assert_eq!(workload.calls(), 0);
        assert_eq!(session.state(), &SessionState::Closed);

        let calls = service.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], ServiceCall::Connect { .. }));
        assert!(matches!(calls[1], ServiceCall::CreateNamespace { .. }));
        assert!(matches!(calls[2], ServiceCall::Disconnect { .. }));
    }

    #[tokio::test]
    async fn test_connect_failure_aborts_before_any_iteration() {
        let service = Arc::new(MemoryLogService::with_faults(FaultPlan {
            refuse_connect: true,
            ..Default::default()
        }));
        let mut session = session_for(&service);
        let workload = ReverseWorkload::new();

        let err = harness(5)
            .run_logged(&workload, &mut session, &StreamTarget::default())
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Setup(LogError::Connection(_))));
        assert_eq!(workload.calls(), 0);
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_conflict_aborts_setup_and_disconnects() {
        let service = Arc::new(MemoryLogService::new());
        let target = StreamTarget::default();

        let mut holder = session_for(&service);
        holder.connect().await.unwrap();
        holder
            .create_namespace(&target.namespace, &Attributes::default(), 1)
            .await
            .unwrap();
        let _held = holder
            .acquire_stream(&target.namespace, &target.stream, &Attributes::default(), 1)
            .await
            .unwrap();

        let mut session = session_for(&service);
        let workload = ReverseWorkload::new();
        let err = harness(2)
            .run_logged(&workload, &mut session, &target)
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Setup(LogError::Acquisition(_))));
        assert_eq!(workload.calls(), 0);
        assert_eq!(session.state(), &SessionState::Closed);

        holder.release_stream(&target.namespace, &target.stream).await.unwrap();
        holder.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_numbers() {
        let service = Arc::new(MemoryLogService::with_faults(FaultPlan {
            fail_release: true,
            ..Default::default()
        }));
        let mut session = session_for(&service);

        let run = harness(2)
            .run_logged(&ReverseWorkload::new(), &mut session, &StreamTarget::default())
            .await
            .unwrap();

        assert_eq!(run.result.iterations(), 2);
        assert!(!run.cleanup.is_clean());
        assert_eq!(run.cleanup.release, None);
        // Still holding, so the disconnect is refused too
        assert!(!run.cleanup.disconnected);
        assert_eq!(run.cleanup.problems.len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_failure_keeps_numbers() {
        let service = Arc::new(MemoryLogService::with_faults(FaultPlan {
            fail_disconnect: true,
            ..Default::default()
        }));
        let mut session = session_for(&service);

        let run = harness(3)
            .run_logged(&ReverseWorkload::new(), &mut session, &StreamTarget::default())
            .await
            .unwrap();

        assert_eq!(run.result.iterations(), 3);
        assert_eq!(run.result.fallback_count(), 0);
        assert_eq!(run.cleanup.release, Some(ReleaseStatus::Released));
        assert!(!run.cleanup.disconnected);
        assert_eq!(run.cleanup.problems.len(), 1);
        assert_eq!(session.state(), &SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_pacing_does_not_panic() {
        let mut pacer = Pacer::new(Duration::MAX);
        pacer.wait().await;
        pacer.wait().await;
        assert!(pacer.last_start.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_workload_timeout_falls_back() {
        let config = HarnessConfig {
            workload_timeout: Some(Duration::from_millis(50)),
            ..HarnessConfig::unpaced(2)
        };
        let workload = ReverseWorkload::with_delay(Duration::from_secs(5));

        let result = BenchmarkHarness::new(config)
            .run_without_logging(&workload)
            .await;

        assert_eq!(result.iterations(), 2);
        assert_eq!(result.fallback_count(), 2);
        assert!(result.samples().iter().all(|s| s.elapsed < Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_timeout_is_fatal() {
        let service = Arc::new(MemoryLogService::with_faults(FaultPlan {
            append_delay: Some(Duration::from_secs(10)),
            ..Default::default()
        }));
        let mut session = session_for(&service);
        let config = HarnessConfig {
            append_timeout: Some(Duration::from_secs(1)),
            ..HarnessConfig::unpaced(3)
        };

        let err = BenchmarkHarness::new(config)
            .run_logged(&ReverseWorkload::new(), &mut session, &StreamTarget::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HarnessError::Append {
                iteration: 1,
                source: AppendError::Timeout(_),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_waits_outside_timed_region() {
        let config = HarnessConfig {
            pacing: Duration::from_secs(2),
            ..HarnessConfig::unpaced(3)
        };
        let workload = ReverseWorkload::with_delay(Duration::from_millis(100));

        let started = Instant::now();
        let result = BenchmarkHarness::new(config)
            .run_without_logging(&workload)
            .await;

        // Starts at t=0, 2, 4; last iteration ends at 4.1s
        assert!(started.elapsed() >= Duration::from_millis(4100));
        assert!(result.total() < Duration::from_secs(1));
    }
}
