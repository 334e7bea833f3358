use async_trait::async_trait;

use super::Workload;
use crate::error::WorkloadError;
use crate::http_client::WorkloadHttpClient;
use crate::models::generate::{GenerateRequest, GenerateResponse};

/// Completion call against an Ollama-style `/api/generate` endpoint
pub struct GenerateWorkload {
    http: WorkloadHttpClient,
    url: String,
    model: String,
}

impl GenerateWorkload {
    pub fn new(http: WorkloadHttpClient, server_url: &str, model: impl Into<String>) -> Self {
        Self {
            http,
            url: format!("{}/api/generate", server_url.trim_end_matches('/')),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Workload for GenerateWorkload {
    fn name(&self) -> &str {
        "generate"
    }

    async fn execute(&self, input: &str) -> Result<String, WorkloadError> {
        let request = GenerateRequest::new(&self.model, input);
        let response: GenerateResponse = self.http.post_json(&self.url, &request, None).await?;
        Ok(response.response.trim().to_string())
    }
}
