use std::sync::Arc;

use super::handle::StreamHandle;
use super::service::LogService;
use super::types::{AcquireReply, Attributes, ClientConfig, ClientId, CreateStatus, Flags, ReleaseStatus};
use crate::error::{LogError, Result};

/// Lifecycle of a [`Session`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no handshake yet
    Disconnected,
    Connected,
    /// Connected and holding the lease on one stream
    Holding { namespace: String, stream: String },
    /// Disconnected after use; every further call is rejected
    Closed,
}

/// Outcome of [`Session::acquire_stream`]
#[derive(Debug)]
pub enum AcquireOutcome {
    Acquired(StreamHandle),
    /// The namespace does not exist
    NotFound,
    /// Another session holds the lease
    Conflict,
}

/// Client-side connection to a logging service.
///
/// Construction performs no I/O. The session walks
/// `Disconnected -> Connected -> Holding -> Connected -> Closed` and holds at
/// most one stream at a time.
pub struct Session {
    id: ClientId,
    config: ClientConfig,
    service: Arc<dyn LogService>,
    state: SessionState,
}

impl Session {
    /// Create a session for `service`; nothing is sent until [`Session::connect`]
    pub fn new(config: ClientConfig, service: Arc<dyn LogService>) -> Self {
        Self {
            id: ClientId::new(),
            config,
            service,
            state: SessionState::Disconnected,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            SessionState::Connected | SessionState::Holding { .. }
        )
    }

    /// Perform the handshake, bounded by `connect_timeout`
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(LogError::Connection(format!(
                "Cannot connect from state {:?}",
                self.state
            )));
        }

        let endpoint = self.config.endpoint();
        tracing::info!(endpoint = %endpoint, client = %self.id, "Connecting to logging service");

        let handshake = self.service.connect(self.id, &self.config);
        match tokio::time::timeout(self.config.connect_timeout, handshake).await {
            Ok(Ok(())) => {
                self.state = SessionState::Connected;
                tracing::info!(endpoint = %endpoint, "Connected to logging service");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(endpoint = %endpoint, error = %e, "Connect failed");
                Err(e)
            }
            Err(_) => {
                tracing::error!(
                    endpoint = %endpoint,
                    timeout = ?self.config.connect_timeout,
                    "Connect timed out"
                );
                Err(LogError::Connection(format!(
                    "Handshake with {} timed out after {:?}",
                    endpoint, self.config.connect_timeout
                )))
            }
        }
    }

    /// Create a namespace; a repeated name reports `AlreadyExists`
    pub async fn create_namespace(
        &self,
        name: &str,
        attrs: &Attributes,
        flags: Flags,
    ) -> Result<CreateStatus> {
        self.require_connected("create_namespace")?;

        let status = self
            .service
            .create_namespace(self.id, name, attrs, flags)
            .await?;
        tracing::info!(namespace = name, status = ?status, "create_namespace");
        Ok(status)
    }

    /// Acquire the exclusive lease on `namespace/name`
    pub async fn acquire_stream(
        &mut self,
        namespace: &str,
        name: &str,
        attrs: &Attributes,
        flags: Flags,
    ) -> Result<AcquireOutcome> {
        self.require_connected("acquire_stream")?;

        if let SessionState::Holding {
            namespace: held_ns,
            stream: held_stream,
        } = &self.state
        {
            return Err(LogError::Acquisition(format!(
                "Session already holds {}/{}",
                held_ns, held_stream
            )));
        }

        let reply = self
            .service
            .acquire_stream(self.id, namespace, name, attrs, flags)
            .await?;

        let outcome = match reply {
            AcquireReply::Acquired(lease) => {
                self.state = SessionState::Holding {
                    namespace: namespace.to_string(),
                    stream: name.to_string(),
                };
                AcquireOutcome::Acquired(StreamHandle::new(self.service.clone(), lease))
            }
            AcquireReply::NotFound => AcquireOutcome::NotFound,
            AcquireReply::Conflict => AcquireOutcome::Conflict,
        };

        tracing::info!(
            namespace = namespace,
            stream = name,
            outcome = outcome.label(),
            "acquire_stream"
        );
        Ok(outcome)
    }

    /// Release the held stream; the pair must match what was acquired
    pub async fn release_stream(&mut self, namespace: &str, name: &str) -> Result<ReleaseStatus> {
        self.require_connected("release_stream")?;

        let held = match &self.state {
            SessionState::Holding { namespace, stream } => Some((namespace.clone(), stream.clone())),
            _ => None,
        };

        let status = match held {
            Some((held_ns, held_stream)) if held_ns == namespace && held_stream == name => {
                let status = self.service.release_stream(self.id, namespace, name).await?;
                // The service may already have handed an expired lease to someone else;
                // either way this session no longer holds it.
                self.state = SessionState::Connected;
                status
            }
            Some((held_ns, held_stream)) => {
                tracing::warn!(
                    requested = %format!("{}/{}", namespace, name),
                    held = %format!("{}/{}", held_ns, held_stream),
                    "Release does not match the acquired stream"
                );
                ReleaseStatus::Mismatch
            }
            None => ReleaseStatus::NotAcquired,
        };

        tracing::info!(namespace = namespace, stream = name, status = ?status, "release_stream");
        Ok(status)
    }

    /// Close the session; refused while a stream is still held
    pub async fn disconnect(&mut self) -> Result<()> {
        match &self.state {
            SessionState::Connected => {}
            SessionState::Holding { namespace, stream } => {
                return Err(LogError::Connection(format!(
                    "Release {}/{} before disconnecting",
                    namespace, stream
                )));
            }
            other => {
                return Err(LogError::Connection(format!(
                    "Cannot disconnect from state {:?}",
                    other
                )));
            }
        }

        self.service.disconnect(self.id).await?;
        self.state = SessionState::Closed;
        tracing::info!(client = %self.id, "Disconnected from logging service");
        Ok(())
    }

    fn require_connected(&self, op: &str) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(LogError::Connection(format!(
                "{} requires a connected session (state: {:?})",
                op, self.state
            )))
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_connected() {
            tracing::warn!(
                client = %self.id,
                state = ?self.state,
                "Session dropped without disconnecting"
            );
        }
    }
}

impl AcquireOutcome {
    fn label(&self) -> &'static str {
        match self {
            AcquireOutcome::Acquired(_) => "acquired",
            AcquireOutcome::NotFound => "not_found",
            AcquireOutcome::Conflict => "conflict",
        }
    }
}
