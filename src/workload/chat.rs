use async_trait::async_trait;

use super::Workload;
use crate::error::WorkloadError;
use crate::http_client::WorkloadHttpClient;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse};

/// Single-turn call against a `/v1/chat/completions` endpoint
pub struct ChatWorkload {
    http: WorkloadHttpClient,
    url: String,
    model: String,
    temperature: Option<f32>,
    api_key: Option<String>,
}

impl ChatWorkload {
    pub fn new(http: WorkloadHttpClient, server_url: &str, model: impl Into<String>) -> Self {
        Self {
            http,
            url: format!("{}/v1/chat/completions", server_url.trim_end_matches('/')),
            model: model.into(),
            temperature: None,
            api_key: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }
}

#[async_trait]
impl Workload for ChatWorkload {
    fn name(&self) -> &str {
        "chat"
    }

    async fn execute(&self, input: &str) -> Result<String, WorkloadError> {
        let request = ChatCompletionRequest::single_turn(&self.model, input, self.temperature);
        let response: ChatCompletionResponse = self
            .http
            .post_json(&self.url, &request, self.api_key.as_deref())
            .await?;

        response
            .first_content()
            .map(|content| content.trim().to_string())
            .ok_or(WorkloadError::Empty)
    }
}
