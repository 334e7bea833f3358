// Event logger bound to one acquired stream

use bytes::Bytes;
use std::sync::Arc;

use super::service::LogService;
use super::types::{Ack, Lease};
use crate::error::AppendError;

/// Handle to a stream whose lease is held by a session.
///
/// Appends are synchronous from the caller's point of view: `append` resolves
/// only once the service has acknowledged the write. There is no buffering,
/// batching or retry. Validity is checked by the service against the lease
/// token, so a handle outliving its lease fails with
/// [`AppendError::InvalidHandle`].
pub struct StreamHandle {
    service: Arc<dyn LogService>,
    lease: Lease,
}

impl StreamHandle {
    /// Bind a lease issued by `service`
    pub fn new(service: Arc<dyn LogService>, lease: Lease) -> Self {
        Self { service, lease }
    }

    pub fn namespace(&self) -> &str {
        &self.lease.namespace
    }

    pub fn stream(&self) -> &str {
        &self.lease.stream
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Append one opaque payload and wait for the acknowledgement
    pub async fn append(&self, payload: impl Into<Bytes>) -> Result<Ack, AppendError> {
        let payload = payload.into();
        let len = payload.len();

        let ack = self.service.append(&self.lease, payload).await?;

        tracing::trace!(
            namespace = %self.lease.namespace,
            stream = %self.lease.stream,
            timestamp = ack.timestamp,
            bytes = len,
            "Event appended"
        );
        Ok(ack)
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("namespace", &self.lease.namespace)
            .field("stream", &self.lease.stream)
            .field("client", &self.lease.client)
            .finish()
    }
}
