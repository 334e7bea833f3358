use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use crate::bench::{HarnessConfig, PayloadFormat, PromptSource, StreamTarget};
use crate::http_client::WorkloadHttpClient;
use crate::logsvc::{Attributes, ClientConfig, Transport};
use crate::workload::{ChatWorkload, GenerateWorkload, ReverseWorkload, Workload, WorkloadKind};

/// Chronobench - event logging overhead benchmark
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Workload to benchmark (generate, chat, reverse)
    #[arg(short, long, env = "WORKLOAD", default_value = "generate")]
    pub workload: WorkloadKind,

    /// Iterations per run
    #[arg(short = 'n', long, env = "ITERATIONS", default_value = "100")]
    pub iterations: usize,

    /// Also run the benchmark with event logging
    #[arg(long, env = "LOGGING_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub logging: bool,

    /// Model name sent to the workload server
    #[arg(short, long, env = "MODEL")]
    pub model: Option<String>,

    /// Base URL of the workload server
    #[arg(short = 'u', long, env = "SERVER_URL")]
    pub server_url: Option<String>,

    /// Bearer token for chat-completions servers
    #[arg(short = 'k', long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Sampling temperature for chat-completions servers
    #[arg(long, env = "TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Use this prompt for every iteration instead of numbered prompts
    #[arg(short, long, env = "PROMPT")]
    pub prompt: Option<String>,

    /// Appended payload (prompt_and_response, response_only)
    #[arg(long, env = "PAYLOAD_FORMAT", default_value = "prompt_and_response")]
    pub payload_format: PayloadFormat,

    /// Minimum interval between iteration starts in milliseconds
    #[arg(long, env = "PACING_MS", default_value = "100")]
    pub pacing_ms: u64,

    /// Bound on each workload call in seconds
    #[arg(long, env = "WORKLOAD_TIMEOUT")]
    pub workload_timeout: Option<u64>,

    /// Bound on each append in seconds
    #[arg(long, env = "APPEND_TIMEOUT")]
    pub append_timeout: Option<u64>,

    /// HTTP request deadline in seconds (none by default)
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT")]
    pub http_timeout: Option<u64>,

    /// Logging service transport (ofi+sockets, ofi+tcp, inproc)
    #[arg(long, env = "LOG_TRANSPORT", default_value = "ofi+sockets")]
    pub log_transport: Transport,

    /// Logging service host
    #[arg(long, env = "LOG_HOST", default_value = "127.0.0.1")]
    pub log_host: String,

    /// Logging service port
    #[arg(long, env = "LOG_PORT", default_value = "5555")]
    pub log_port: u16,

    /// Lease interval granted to the acquired stream
    #[arg(long, env = "LEASE_SECONDS", default_value = "55")]
    pub lease_seconds: u64,

    /// Namespace the logged run writes into
    #[arg(long, env = "LOG_NAMESPACE", default_value = "bench_chronicle_llama")]
    pub namespace: String,

    /// Stream the logged run writes into
    #[arg(long, env = "LOG_STREAM", default_value = "bench_story_llama")]
    pub stream: String,

    /// Stream attribute as KEY=VALUE (retention_policy, lease_seconds, priority)
    #[arg(long = "stream-attr", value_name = "KEY=VALUE")]
    pub stream_attrs: Vec<String>,

    /// Serve the workload from a built-in mock LLM server
    #[arg(long)]
    pub standalone: bool,

    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Workload
    pub workload: WorkloadKind,
    pub model: String,
    pub server_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,

    // Harness
    pub iterations: usize,
    pub logging_enabled: bool,
    pub prompt: Option<String>,
    pub payload_format: PayloadFormat,
    pub pacing_ms: u64,
    pub workload_timeout: Option<u64>,
    pub append_timeout: Option<u64>,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: Option<u64>,

    // Logging service
    pub log_transport: Transport,
    pub log_host: String,
    pub log_port: u16,
    pub lease_seconds: u64,
    pub namespace: String,
    pub stream: String,
    pub stream_attrs: Vec<(String, String)>,

    // Output
    pub standalone: bool,
    pub json: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let stream_attrs = args
            .stream_attrs
            .iter()
            .map(|pair| parse_pair(pair))
            .collect::<Result<Vec<_>>>()?;

        Ok(Config {
            model: args
                .model
                .unwrap_or_else(|| default_model(args.workload).to_string()),
            server_url: args
                .server_url
                .unwrap_or_else(|| default_server_url(args.workload).to_string()),
            workload: args.workload,
            api_key: args.api_key.filter(|k| !k.is_empty()),
            temperature: args.temperature,

            iterations: args.iterations,
            logging_enabled: args.logging,
            prompt: args.prompt.filter(|p| !p.is_empty()),
            payload_format: args.payload_format,
            pacing_ms: args.pacing_ms,
            workload_timeout: args.workload_timeout,
            append_timeout: args.append_timeout,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            http_request_timeout: args.http_timeout,

            log_transport: args.log_transport,
            log_host: args.log_host,
            log_port: args.log_port,
            lease_seconds: args.lease_seconds,
            namespace: args.namespace,
            stream: args.stream,
            stream_attrs,

            standalone: args.standalone,
            json: args.json,
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.log_port == 0 {
            anyhow::bail!("LOG_PORT must be non-zero");
        }
        if self.lease_seconds == 0 {
            anyhow::bail!("LEASE_SECONDS must be non-zero");
        }
        if self.namespace.trim().is_empty() {
            anyhow::bail!("Namespace name must not be empty");
        }
        if self.stream.trim().is_empty() {
            anyhow::bail!("Stream name must not be empty");
        }
        if self.pacing_ms > MAX_PACING_MS {
            anyhow::bail!("PACING_MS must be at most {}, got {}", MAX_PACING_MS, self.pacing_ms);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("TEMPERATURE must be within [0, 2], got {}", self.temperature);
        }
        Attributes::from_pairs(self.stream_attrs.iter().cloned())
            .context("Invalid --stream-attr")?;
        Ok(())
    }

    /// Harness settings derived from this configuration
    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            iterations: self.iterations,
            pacing: Duration::from_millis(self.pacing_ms),
            workload_timeout: self.workload_timeout.map(Duration::from_secs),
            append_timeout: self.append_timeout.map(Duration::from_secs),
            payload_format: self.payload_format,
            prompts: match &self.prompt {
                Some(text) => PromptSource::Fixed(text.clone()),
                None => PromptSource::Numbered,
            },
        }
    }

    /// Logging-service client settings
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            transport: self.log_transport,
            host: self.log_host.clone(),
            port: self.log_port,
            lease_seconds: self.lease_seconds,
            ..Default::default()
        }
    }

    /// Namespace and stream for the logged run
    pub fn stream_target(&self) -> Result<StreamTarget> {
        let mut target = StreamTarget::new(&self.namespace, &self.stream);
        target.stream_attrs = Attributes::from_pairs(self.stream_attrs.iter().cloned())?;
        Ok(target)
    }

    /// Instantiate the selected workload against `server_url`
    pub fn build_workload(&self) -> Result<Box<dyn Workload>> {
        let workload: Box<dyn Workload> = match self.workload {
            WorkloadKind::Reverse => Box::new(ReverseWorkload::new()),
            WorkloadKind::Generate => Box::new(GenerateWorkload::new(
                self.http_client()?,
                &self.server_url,
                &self.model,
            )),
            WorkloadKind::Chat => Box::new(
                ChatWorkload::new(self.http_client()?, &self.server_url, &self.model)
                    .with_temperature(self.temperature)
                    .with_api_key(self.api_key.clone()),
            ),
        };
        Ok(workload)
    }

    fn http_client(&self) -> Result<WorkloadHttpClient> {
        WorkloadHttpClient::new(
            self.http_max_connections,
            self.http_connect_timeout,
            self.http_request_timeout,
        )
    }
}

/// Upper bound on `--pacing-ms` (one hour)
const MAX_PACING_MS: u64 = 3_600_000;

/// Default model per workload
fn default_model(kind: WorkloadKind) -> &'static str {
    match kind {
        WorkloadKind::Chat => "gpt-3.5-turbo",
        WorkloadKind::Generate | WorkloadKind::Reverse => "llama3.2",
    }
}

/// Default server per workload
fn default_server_url(kind: WorkloadKind) -> &'static str {
    match kind {
        WorkloadKind::Chat => "https://api.openai.com",
        WorkloadKind::Generate | WorkloadKind::Reverse => "http://localhost:11434",
    }
}

/// Split a `KEY=VALUE` argument
fn parse_pair(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got '{}'", s))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}
