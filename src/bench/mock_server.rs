//! Mock LLM server answering `/api/generate` and `/v1/chat/completions`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use rand::Rng;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::config::MockServerConfig;
use crate::models::generate::{GenerateRequest, GenerateResponse};
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};

/// Mock LLM server for offline benchmarking
pub struct MockLlmServer {
    config: MockServerConfig,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockLlmServer {
    /// Create a new mock server with the given configuration
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Start the mock server and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let config = Arc::new(self.config.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = Router::new()
            .route("/api/generate", post(handle_generate))
            .route("/v1/chat/completions", post(handle_chat))
            .with_state(config);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tracing::info!(port = port, "Mock LLM server listening");
        Ok(port)
    }

    /// Get the server's URL
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockLlmServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep for the configured latency, then maybe fail
async fn simulate(config: &MockServerConfig) -> Option<Response> {
    if config.latency_ms > 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(config.latency_ms)).await;
    }

    if config.error_rate > 0.0 {
        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < config.error_rate {
            return Some((StatusCode::INTERNAL_SERVER_ERROR, "Simulated error").into_response());
        }
    }
    None
}

fn reply_text(config: &MockServerConfig) -> String {
    config
        .reply
        .clone()
        .unwrap_or_else(|| generate_content(config.reply_size))
}

/// Handle /api/generate requests
async fn handle_generate(
    State(config): State<Arc<MockServerConfig>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if let Some(failure) = simulate(&config).await {
        return failure;
    }

    Json(GenerateResponse {
        model: request.model,
        response: reply_text(&config),
        done: true,
    })
    .into_response()
}

/// Handle /v1/chat/completions requests
async fn handle_chat(
    State(config): State<Arc<MockServerConfig>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    if let Some(failure) = simulate(&config).await {
        return failure;
    }

    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4().simple());
    Json(ChatCompletionResponse::new(id, request.model, reply_text(&config))).into_response()
}

/// Generate random content of the specified size
fn generate_content(size: usize) -> String {
    const WORDS: &[&str] = &[
        "the", "number", "seven", "is", "prime", "and", "appears", "in", "many", "stories",
        "myths", "week", "days", "colors", "of", "rainbow", "notes", "scale", "a", "curious",
        "fact",
    ];

    let mut rng = rand::thread_rng();
    let mut result = String::with_capacity(size);

    while result.len() < size {
        let word = WORDS[rng.gen_range(0..WORDS.len())];
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
    }

    result.truncate(size);
    result
}
