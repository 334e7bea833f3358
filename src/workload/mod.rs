//! Workload adapters: one external call per `execute`, no knowledge of logging.
//!
//! Two HTTP bindings ship with the crate ([`GenerateWorkload`] for
//! `/api/generate` servers, [`ChatWorkload`] for chat-completions servers) plus
//! deterministic fakes used by tests and the `reverse` selector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorkloadError;

mod chat;
mod fakes;
mod generate;

pub use chat::ChatWorkload;
pub use fakes::{FailingWorkload, FlakyWorkload, ReverseWorkload};
pub use generate::GenerateWorkload;

/// A single external request/response call whose latency is measured
#[async_trait]
pub trait Workload: Send + Sync {
    /// Short label used in logs and reports
    fn name(&self) -> &str;

    /// Run one call. Implementations impose no timeout of their own.
    async fn execute(&self, input: &str) -> Result<String, WorkloadError>;
}

/// Workload selector accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkloadKind {
    #[default]
    Generate,
    Chat,
    Reverse,
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadKind::Generate => write!(f, "generate"),
            WorkloadKind::Chat => write!(f, "chat"),
            WorkloadKind::Reverse => write!(f, "reverse"),
        }
    }
}

impl std::str::FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generate" | "ollama" => Ok(WorkloadKind::Generate),
            "chat" | "openai" => Ok(WorkloadKind::Chat),
            "reverse" => Ok(WorkloadKind::Reverse),
            _ => Err(format!("Unknown workload: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_kind_parse() {
        assert_eq!("generate".parse::<WorkloadKind>().unwrap(), WorkloadKind::Generate);
        assert_eq!("OLLAMA".parse::<WorkloadKind>().unwrap(), WorkloadKind::Generate);
        assert_eq!("openai".parse::<WorkloadKind>().unwrap(), WorkloadKind::Chat);
        assert_eq!("Reverse".parse::<WorkloadKind>().unwrap(), WorkloadKind::Reverse);
        assert!("pdf".parse::<WorkloadKind>().is_err());
    }

    #[test]
    fn test_workload_kind_display_round_trip() {
        for kind in [WorkloadKind::Generate, WorkloadKind::Chat, WorkloadKind::Reverse] {
            assert_eq!(kind.to_string().parse::<WorkloadKind>().unwrap(), kind);
        }
    }
}
