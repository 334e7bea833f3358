use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::WorkloadError;

/// Shared HTTP client for HTTP-backed workloads.
///
/// Single attempt per call: the benchmark measures the upstream as it
/// behaves, so there is no retry or backoff here. Requests have no deadline
/// unless one is configured; bounded waits belong to the harness.
#[derive(Clone)]
pub struct WorkloadHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,
    request_timeout: Option<Duration>,
}

impl WorkloadHttpClient {
    /// Create a new HTTP client
    pub fn new(
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: Option<u64>,
    ) -> Result<Self> {
        let request_timeout = request_timeout.map(Duration::from_secs);

        let mut builder = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout));
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// Whole-request deadline, if any
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// POST `body` as JSON and decode a JSON reply
    pub async fn post_json<B, R>(
        &self,
        url: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> std::result::Result<R, WorkloadError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::debug!(url = %url, "Sending workload request");

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| {
            let error_kind = classify(&e);
            tracing::warn!(
                error_kind = error_kind,
                error = %e,
                url = %url,
                "HTTP request error"
            );
            WorkloadError::Transport {
                kind: error_kind,
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                response_body = %error_text,
                "Workload request failed with error response"
            );
            return Err(WorkloadError::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let bytes = response.bytes().await.map_err(|e| WorkloadError::Transport {
            kind: classify(&e),
            message: e.to_string(),
        })?;

        serde_json::from_slice(&bytes).map_err(|e| WorkloadError::Parse(e.to_string()))
    }
}

/// Categorize a reqwest error for logs and error variants
fn classify(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_post_json_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/echo")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = WorkloadHttpClient::new(4, 5, Some(5)).unwrap();
        let reply: Value = client
            .post_json(&format!("{}/echo", server.url()), &json!({"x": 1}), Some("secret"))
            .await
            .unwrap();

        assert_eq!(reply["ok"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_json_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/fail")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = WorkloadHttpClient::new(4, 5, Some(5)).unwrap();
        let err = client
            .post_json::<_, Value>(&format!("{}/fail", server.url()), &json!({}), None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            WorkloadError::Status {
                status: 503,
                body: "overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_post_json_bad_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/garbage")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = WorkloadHttpClient::new(4, 5, Some(5)).unwrap();
        let err = client
            .post_json::<_, Value>(&format!("{}/garbage", server.url()), &json!({}), None)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkloadError::Parse(_)));
    }

    #[test]
    fn test_request_timeout_is_optional() {
        let unbounded = WorkloadHttpClient::new(4, 5, None).unwrap();
        assert_eq!(unbounded.request_timeout(), None);

        let bounded = WorkloadHttpClient::new(4, 5, Some(30)).unwrap();
        assert_eq!(bounded.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = WorkloadHttpClient::new(4, 1, Some(1)).unwrap();
        let err = client
            .post_json::<_, Value>("http://127.0.0.1:1/nothing", &json!({}), None)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkloadError::Transport { .. }));
    }
}
