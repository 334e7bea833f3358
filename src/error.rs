// Error handling module
// Defines the error taxonomy shared by workloads, the logging client and the harness

use thiserror::Error;

use crate::bench::CleanupReport;

/// Failure of a single external workload call.
///
/// The harness recovers from every variant locally by substituting the
/// fallback output, so none of these abort a benchmark run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkloadError {
    /// Upstream answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, TLS or body transfer failure
    #[error("Transport error ({kind}): {message}")]
    Transport { kind: &'static str, message: String },

    /// Call did not finish within the bounded wait
    #[error("Workload timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Response body could not be decoded into the expected shape
    #[error("Unparsable response: {0}")]
    Parse(String),

    /// Response decoded but carried no usable text
    #[error("Response contained no output")]
    Empty,

    /// Scripted failure raised by a fake workload
    #[error("Injected failure: {0}")]
    Injected(String),
}

impl WorkloadError {
    /// Short machine-friendly label used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            WorkloadError::Status { .. } => "status",
            WorkloadError::Transport { kind, .. } => kind,
            WorkloadError::Timeout(_) => "timeout",
            WorkloadError::Parse(_) => "parse",
            WorkloadError::Empty => "empty",
            WorkloadError::Injected(_) => "injected",
        }
    }
}

/// Errors raised by the logging-service client during session setup and teardown
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogError {
    /// The logging service could not be reached, or the session is in the wrong state
    #[error("Connection error: {0}")]
    Connection(String),

    /// Namespace creation or stream acquisition failed
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// An attribute key or value is not recognized
    #[error("Invalid attribute {key}: {reason}")]
    InvalidAttribute { key: String, reason: String },
}

/// Failure of a single append on a stream handle.
///
/// Always fatal to the run it belongs to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppendError {
    /// The handle's lease is unknown to the service or was released
    #[error("Stream {namespace}/{stream} is not held by this handle")]
    InvalidHandle { namespace: String, stream: String },

    /// The service refused or lost the write
    #[error("Service rejected write: {0}")]
    Rejected(String),

    /// The service did not acknowledge within the bounded wait
    #[error("Append timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors that end a benchmark run without a result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HarnessError {
    /// Connect, namespace creation or stream acquisition failed before any iteration ran
    #[error("Setup failed: {0}")]
    Setup(#[from] LogError),

    /// An append failed; the run was aborted at this iteration (1-based)
    #[error("Append failed at iteration {iteration}: {source}")]
    Append {
        iteration: usize,
        #[source]
        source: AppendError,
        /// Release and disconnect outcome, when the run owned the session
        cleanup: Option<CleanupReport>,
    },

    /// Overhead requested for two results with different iteration counts
    #[error("Iteration count mismatch: with_logging={with_logging}, without_logging={without_logging}")]
    IterationMismatch {
        with_logging: usize,
        without_logging: usize,
    },
}

/// Result type alias for logging-service operations
pub type Result<T> = std::result::Result<T, LogError>;
