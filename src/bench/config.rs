//! Configuration structs for benchmarking.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::logsvc::{Attributes, Flags};

/// Output substituted for a failed workload call
pub const FALLBACK_OUTPUT: &str = "No response received due to an error.";

/// What gets appended to the stream for each iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PayloadFormat {
    /// `Prompt: {input}\nResponse: {output}`
    #[default]
    PromptAndResponse,
    /// The workload output alone
    ResponseOnly,
}

impl PayloadFormat {
    /// Build the event payload for one iteration
    pub fn compose(&self, input: &str, output: &str) -> String {
        match self {
            PayloadFormat::PromptAndResponse => format!("Prompt: {}\nResponse: {}", input, output),
            PayloadFormat::ResponseOnly => output.to_string(),
        }
    }
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadFormat::PromptAndResponse => write!(f, "prompt_and_response"),
            PayloadFormat::ResponseOnly => write!(f, "response_only"),
        }
    }
}

impl std::str::FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prompt_and_response" | "both" => Ok(PayloadFormat::PromptAndResponse),
            "response_only" | "response" => Ok(PayloadFormat::ResponseOnly),
            _ => Err(format!("Unknown payload format: {}", s)),
        }
    }
}

/// Where each iteration's input comes from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptSource {
    /// A prompt that mentions the iteration number
    #[default]
    Numbered,
    /// The same prompt every iteration
    Fixed(String),
}

impl PromptSource {
    /// Input for iteration `i` (1-based)
    pub fn prompt(&self, i: usize) -> String {
        match self {
            PromptSource::Numbered => format!(
                "Test prompt {}: Tell me something interesting about the number {} in short.",
                i, i
            ),
            PromptSource::Fixed(text) => text.clone(),
        }
    }
}

/// Configuration for a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Iterations per run
    pub iterations: usize,
    /// Minimum interval between the starts of consecutive iterations (untimed)
    pub pacing: Duration,
    /// Bounded wait on each workload call
    pub workload_timeout: Option<Duration>,
    /// Bounded wait on each append
    pub append_timeout: Option<Duration>,
    pub payload_format: PayloadFormat,
    pub prompts: PromptSource,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            pacing: Duration::from_millis(100),
            workload_timeout: None,
            append_timeout: None,
            payload_format: PayloadFormat::PromptAndResponse,
            prompts: PromptSource::Numbered,
        }
    }
}

impl HarnessConfig {
    /// Config with no pacing, handy for tests and offline runs
    pub fn unpaced(iterations: usize) -> Self {
        Self {
            iterations,
            pacing: Duration::ZERO,
            ..Default::default()
        }
    }
}

/// Namespace and stream a logged run writes into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTarget {
    pub namespace: String,
    pub stream: String,
    pub namespace_attrs: Attributes,
    pub stream_attrs: Attributes,
    pub flags: Flags,
}

impl Default for StreamTarget {
    fn default() -> Self {
        Self::new("bench_chronicle_llama", "bench_story_llama")
    }
}

impl StreamTarget {
    pub fn new(namespace: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            stream: stream.into(),
            namespace_attrs: Attributes::default(),
            stream_attrs: Attributes::default(),
            flags: 1,
        }
    }
}

/// Configuration for the mock LLM server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockServerConfig {
    /// Port to listen on (0 for random)
    pub port: u16,
    /// Simulated latency per request in milliseconds
    pub latency_ms: u64,
    /// Size of generated replies in characters
    pub reply_size: usize,
    /// Fixed reply text; random words when unset
    pub reply: Option<String>,
    /// Error rate (0.0 to 1.0)
    pub error_rate: f64,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            latency_ms: 20,
            reply_size: 400,
            reply: None,
            error_rate: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_prompt_and_response() {
        let payload = PayloadFormat::PromptAndResponse.compose("why?", "because");
        assert_eq!(payload, "Prompt: why?\nResponse: because");
    }

    #[test]
    fn test_compose_response_only() {
        assert_eq!(PayloadFormat::ResponseOnly.compose("why?", "because"), "because");
    }

    #[test]
    fn test_payload_format_parse() {
        assert_eq!(
            "response_only".parse::<PayloadFormat>().unwrap(),
            PayloadFormat::ResponseOnly
        );
        assert_eq!(
            "BOTH".parse::<PayloadFormat>().unwrap(),
            PayloadFormat::PromptAndResponse
        );
        assert!("xml".parse::<PayloadFormat>().is_err());
    }

    #[test]
    fn test_numbered_prompts() {
        let prompt = PromptSource::Numbered.prompt(7);
        assert_eq!(
            prompt,
            "Test prompt 7: Tell me something interesting about the number 7 in short."
        );
        let fixed = PromptSource::Fixed("same".to_string());
        assert_eq!(fixed.prompt(1), fixed.prompt(99));
    }

    #[test]
    fn test_default_target() {
        let target = StreamTarget::default();
        assert_eq!(target.namespace, "bench_chronicle_llama");
        assert_eq!(target.stream, "bench_story_llama");
        assert_eq!(target.flags, 1);
    }
}
