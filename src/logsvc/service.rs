//! The logging-service boundary and its in-process implementation.
//!
//! [`LogService`] is the seam a real service binding plugs into. Every rule
//! the service owns lives behind it: the namespace registry, exclusive stream
//! leases, event ordering and logical timestamps. [`MemoryLogService`]
//! enforces those rules in memory and keeps a journal of every call it
//! receives.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::types::{
    AcquireReply, Ack, Attributes, ClientConfig, ClientId, CreateStatus, Event, Flags, Lease,
    ReleaseStatus, RetentionPolicy,
};
use crate::error::{AppendError, LogError, Result};

/// Operations offered by an event-logging service
#[async_trait]
pub trait LogService: Send + Sync {
    /// Register a client and complete the handshake
    async fn connect(&self, client: ClientId, config: &ClientConfig) -> Result<()>;

    /// Create a namespace; idempotent per name
    async fn create_namespace(
        &self,
        client: ClientId,
        name: &str,
        attrs: &Attributes,
        flags: Flags,
    ) -> Result<CreateStatus>;

    /// Take the exclusive lease on a stream, creating the stream on first use
    async fn acquire_stream(
        &self,
        client: ClientId,
        namespace: &str,
        name: &str,
        attrs: &Attributes,
        flags: Flags,
    ) -> Result<AcquireReply>;

    /// Give up the lease on a stream held by `client`
    async fn release_stream(
        &self,
        client: ClientId,
        namespace: &str,
        name: &str,
    ) -> Result<ReleaseStatus>;

    /// Unregister a client; fails while it still holds a lease
    async fn disconnect(&self, client: ClientId) -> Result<()>;

    /// Durably append one payload under `lease`
    async fn append(&self, lease: &Lease, payload: Bytes) -> std::result::Result<Ack, AppendError>;
}

// ==================================================================================================
// Journal and fault injection
// ==================================================================================================

/// One call received by [`MemoryLogService`], in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Connect {
        client: ClientId,
    },
    CreateNamespace {
        client: ClientId,
        name: String,
    },
    AcquireStream {
        client: ClientId,
        namespace: String,
        stream: String,
    },
    ReleaseStream {
        client: ClientId,
        namespace: String,
        stream: String,
    },
    Disconnect {
        client: ClientId,
    },
    Append {
        namespace: String,
        stream: String,
        token: Uuid,
        payload: Bytes,
    },
}

impl ServiceCall {
    pub fn is_append(&self) -> bool {
        matches!(self, ServiceCall::Append { .. })
    }
}

/// Failures [`MemoryLogService`] should simulate
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Every connect is refused
    pub refuse_connect: bool,
    /// Delay before the handshake completes
    pub connect_delay: Option<Duration>,
    /// Namespace creation fails
    pub fail_create_namespace: bool,
    /// The n-th append received by the service (1-based) is rejected
    pub fail_append_at: Option<u64>,
    /// Delay before each append is acknowledged
    pub append_delay: Option<Duration>,
    pub fail_release: bool,
    pub fail_disconnect: bool,
}

// ==================================================================================================
// In-process service
// ==================================================================================================

#[derive(Debug)]
struct LeaseEntry {
    client: ClientId,
    token: Uuid,
    duration: Duration,
    last_seen: Instant,
}

impl LeaseEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_seen) > self.duration
    }
}

#[derive(Debug)]
struct StreamEntry {
    attrs: Attributes,
    #[allow(dead_code)]
    flags: Flags,
    events: VecDeque<Event>,
    next_position: u64,
    lease: Option<LeaseEntry>,
}

#[derive(Debug)]
struct NamespaceEntry {
    #[allow(dead_code)]
    attrs: Attributes,
    #[allow(dead_code)]
    flags: Flags,
    streams: HashMap<String, StreamEntry>,
}

/// Thread-safe in-memory logging service
pub struct MemoryLogService {
    /// Namespaces indexed by name
    namespaces: DashMap<String, NamespaceEntry>,

    /// Connected clients and their configuration
    clients: DashMap<ClientId, ClientConfig>,

    /// Logical clock for event timestamps
    clock: AtomicU64,

    /// Appends received, including rejected ones
    appends_received: AtomicU64,

    faults: FaultPlan,

    journal: Mutex<Vec<ServiceCall>>,
}

impl MemoryLogService {
    /// Create an empty service with no simulated faults
    pub fn new() -> Self {
        Self::with_faults(FaultPlan::default())
    }

    /// Create an empty service that simulates the given failures
    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            namespaces: DashMap::new(),
            clients: DashMap::new(),
            clock: AtomicU64::new(0),
            appends_received: AtomicU64::new(0),
            faults,
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.journal
            .lock()
            .map(|journal| journal.clone())
            .unwrap_or_default()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.journal.lock().map(|j| j.len()).unwrap_or(0)
    }

    /// Snapshot of the events currently stored in a stream
    pub fn events(&self, namespace: &str, stream: &str) -> Option<Vec<Event>> {
        let ns = self.namespaces.get(namespace)?;
        let entry = ns.streams.get(stream)?;
        Some(entry.events.iter().cloned().collect())
    }

    /// Names of all namespaces, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Whether `client` is currently connected
    pub fn is_connected(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    fn record(&self, call: ServiceCall) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(call);
        }
    }

    fn require_client(&self, client: ClientId) -> Result<ClientConfig> {
        self.clients
            .get(&client)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LogError::Connection(format!("Client {} is not connected", client)))
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn holds_any_lease(&self, client: ClientId) -> Option<(String, String)> {
        self.namespaces.iter().find_map(|ns| {
            ns.streams.iter().find_map(|(name, stream)| {
                stream
                    .lease
                    .as_ref()
                    .filter(|lease| lease.client == client)
                    .map(|_| (ns.key().clone(), name.clone()))
            })
        })
    }
}

impl Default for MemoryLogService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogService for MemoryLogService {
    async fn connect(&self, client: ClientId, config: &ClientConfig) -> Result<()> {
        self.record(ServiceCall::Connect { client });

        if let Some(delay) = self.faults.connect_delay {
            tokio::time::sleep(delay).await;
        }

        if self.faults.refuse_connect {
            return Err(LogError::Connection(format!(
                "Connection refused by {}",
                config.endpoint()
            )));
        }

        self.clients.insert(client, config.clone());
        tracing::debug!(client = %client, endpoint = %config.endpoint(), "Client connected");
        Ok(())
    }

    async fn create_namespace(
        &self,
        client: ClientId,
        name: &str,
        attrs: &Attributes,
        flags: Flags,
    ) -> Result<CreateStatus> {
        self.record(ServiceCall::CreateNamespace {
            client,
            name: name.to_string(),
        });
        self.require_client(client)?;

        if self.faults.fail_create_namespace {
            return Err(LogError::Acquisition(format!(
                "Service failed to create namespace {}",
                name
            )));
        }

        let mut created = false;
        self.namespaces.entry(name.to_string()).or_insert_with(|| {
            created = true;
            NamespaceEntry {
                attrs: attrs.clone(),
                flags,
                streams: HashMap::new(),
            }
        });

        Ok(if created {
            CreateStatus::Created
        } else {
            CreateStatus::AlreadyExists
        })
    }

    async fn acquire_stream(
        &self,
        client: ClientId,
        namespace: &str,
        name: &str,
        attrs: &Attributes,
        flags: Flags,
    ) -> Result<AcquireReply> {
        self.record(ServiceCall::AcquireStream {
            client,
            namespace: namespace.to_string(),
            stream: name.to_string(),
        });
        let config = self.require_client(client)?;

        let Some(mut ns) = self.namespaces.get_mut(namespace) else {
            return Ok(AcquireReply::NotFound);
        };

        let stream = ns
            .streams
            .entry(name.to_string())
            .or_insert_with(|| StreamEntry {
                attrs: attrs.clone(),
                flags,
                events: VecDeque::new(),
                next_position: 0,
                lease: None,
            });

        let now = Instant::now();
        if let Some(lease) = &stream.lease {
            if lease.client != client && !lease.is_expired(now) {
                return Ok(AcquireReply::Conflict);
            }
            if lease.client != client {
                tracing::warn!(
                    namespace = namespace,
                    stream = name,
                    previous_holder = %lease.client,
                    "Taking over expired lease"
                );
            }
        }

        let lease_seconds = stream.attrs.lease_seconds.unwrap_or(config.lease_seconds);
        let token = Uuid::new_v4();
        stream.lease = Some(LeaseEntry {
            client,
            token,
            duration: Duration::from_secs(lease_seconds),
            last_seen: now,
        });

        Ok(AcquireReply::Acquired(Lease {
            client,
            namespace: namespace.to_string(),
            stream: name.to_string(),
            token,
        }))
    }

    async fn release_stream(
        &self,
        client: ClientId,
        namespace: &str,
        name: &str,
    ) -> Result<ReleaseStatus> {
        self.record(ServiceCall::ReleaseStream {
            client,
            namespace: namespace.to_string(),
            stream: name.to_string(),
        });
        self.require_client(client)?;

        if self.faults.fail_release {
            return Err(LogError::Acquisition(format!(
                "Service failed to release {}/{}",
                namespace, name
            )));
        }

        let Some(mut ns) = self.namespaces.get_mut(namespace) else {
            return Ok(ReleaseStatus::NotAcquired);
        };
        let Some(stream) = ns.streams.get_mut(name) else {
            return Ok(ReleaseStatus::NotAcquired);
        };

        match &stream.lease {
            Some(lease) if lease.client == client => {
                stream.lease = None;
                if stream.attrs.retention_policy == RetentionPolicy::DropOnRelease {
                    stream.events.clear();
                }
                Ok(ReleaseStatus::Released)
            }
            _ => Ok(ReleaseStatus::NotAcquired),
        }
    }

    async fn disconnect(&self, client: ClientId) -> Result<()> {
        self.record(ServiceCall::Disconnect { client });
        self.require_client(client)?;

        if self.faults.fail_disconnect {
            return Err(LogError::Connection(
                "Service failed to close the session".to_string(),
            ));
        }

        if let Some((namespace, stream)) = self.holds_any_lease(client) {
            return Err(LogError::Connection(format!(
                "Client still holds {}/{}",
                namespace, stream
            )));
        }

        self.clients.remove(&client);
        tracing::debug!(client = %client, "Client disconnected");
        Ok(())
    }

    async fn append(&self, lease: &Lease, payload: Bytes) -> std::result::Result<Ack, AppendError> {
        self.record(ServiceCall::Append {
            namespace: lease.namespace.clone(),
            stream: lease.stream.clone(),
            token: lease.token,
            payload: payload.clone(),
        });
        let nth = self.appends_received.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.faults.append_delay {
            tokio::time::sleep(delay).await;
        }

        let invalid = || AppendError::InvalidHandle {
            namespace: lease.namespace.clone(),
            stream: lease.stream.clone(),
        };

        if !self.clients.contains_key(&lease.client) {
            return Err(invalid());
        }

        let mut ns = self.namespaces.get_mut(&lease.namespace).ok_or_else(invalid)?;
        let stream = ns.streams.get_mut(&lease.stream).ok_or_else(invalid)?;

        let now = Instant::now();
        match stream.lease.as_mut() {
            Some(held) if held.token == lease.token => held.last_seen = now,
            _ => return Err(invalid()),
        }

        if self.faults.fail_append_at == Some(nth) {
            return Err(AppendError::Rejected(format!(
                "Simulated write failure on append #{}",
                nth
            )));
        }

        let timestamp = self.tick();
        let position = stream.next_position;
        stream.next_position += 1;
        stream.events.push_back(Event { payload, timestamp });

        if let RetentionPolicy::KeepLatest(limit) = stream.attrs.retention_policy {
            while stream.events.len() > limit {
                stream.events.pop_front();
            }
        }

        Ok(Ack {
            timestamp,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected(service: &MemoryLogService) -> ClientId {
        let client = ClientId::new();
        service
            .connect(client, &ClientConfig::default())
            .await
            .unwrap();
        client
    }

    async fn acquire(service: &MemoryLogService, client: ClientId, attrs: &Attributes) -> Lease {
        service
            .create_namespace(client, "ns", &Attributes::default(), 1)
            .await
            .unwrap();
        match service
            .acquire_stream(client, "ns", "story", attrs, 1)
            .await
            .unwrap()
        {
            AcquireReply::Acquired(lease) => lease,
            other => panic!("expected Acquired, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_namespace_is_idempotent() {
        let service = MemoryLogService::new();
        let client = connected(&service).await;

        let first = service
            .create_namespace(client, "chronicle", &Attributes::default(), 1)
            .await
            .unwrap();
        let second = service
            .create_namespace(client, "chronicle", &Attributes::default(), 1)
            .await
            .unwrap();

        assert_eq!(first, CreateStatus::Created);
        assert_eq!(second, CreateStatus::AlreadyExists);
        assert_eq!(service.namespaces(), vec!["chronicle".to_string()]);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let service = MemoryLogService::new();
        let err = service
            .create_namespace(ClientId::new(), "ns", &Attributes::default(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Connection(_)));
    }

    #[tokio::test]
    async fn test_acquire_unknown_namespace_is_not_found() {
        let service = MemoryLogService::new();
        let client = connected(&service).await;

        let reply = service
            .acquire_stream(client, "missing", "story", &Attributes::default(), 0)
            .await
            .unwrap();
        assert_eq!(reply, AcquireReply::NotFound);
    }

    #[tokio::test]
    async fn test_events_get_increasing_timestamps() {
        let service = MemoryLogService::new();
        let client = connected(&service).await;
        let lease = acquire(&service, client, &Attributes::default()).await;

        let a = service.append(&lease, Bytes::from("one")).await.unwrap();
        let b = service.append(&lease, Bytes::from("two")).await.unwrap();

        assert!(b.timestamp > a.timestamp);
        assert_eq!((a.position, b.position), (0, 1));

        let events = service.events("ns", "story").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, Bytes::from("one"));
        assert_eq!(events[1].payload, Bytes::from("two"));
    }

    #[tokio::test]
    async fn test_append_with_forged_lease_fails() {
        let service = MemoryLogService::new();
        let client = connected(&service).await;
        let mut lease = acquire(&service, client, &Attributes::default()).await;
        lease.token = Uuid::new_v4();

        let err = service.append(&lease, Bytes::from("x")).await.unwrap_err();
        assert!(matches!(err, AppendError::InvalidHandle { .. }));
        assert!(service.events("ns", "story").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keep_latest_retention_trims_old_events() {
        let service = MemoryLogService::new();
        let client = connected(&service).await;
        let attrs = Attributes {
            retention_policy: RetentionPolicy::KeepLatest(2),
            ..Default::default()
        };
        let lease = acquire(&service, client, &attrs).await;

        for payload in ["a", "b", "c"] {
            service.append(&lease, Bytes::from(payload)).await.unwrap();
        }

        let kept: Vec<Bytes> = service
            .events("ns", "story")
            .unwrap()
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(kept, vec![Bytes::from("b"), Bytes::from("c")]);
    }

    #[tokio::test]
    async fn test_drop_on_release_discards_events() {
        let service = MemoryLogService::new();
        let client = connected(&service).await;
        let attrs = Attributes {
            retention_policy: RetentionPolicy::DropOnRelease,
            ..Default::default()
        };
        let lease = acquire(&service, client, &attrs).await;
        service.append(&lease, Bytes::from("gone")).await.unwrap();

        let status = service.release_stream(client, "ns", "story").await.unwrap();
        assert_eq!(status, ReleaseStatus::Released);
        assert!(service.events("ns", "story").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_refused_while_holding_lease() {
        let service = MemoryLogService::new();
        let client = connected(&service).await;
        acquire(&service, client, &Attributes::default()).await;

        assert!(service.disconnect(client).await.is_err());
        service.release_stream(client, "ns", "story").await.unwrap();
        service.disconnect(client).await.unwrap();
        assert!(!service.is_connected(client));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_can_be_taken_over() {
        let service = MemoryLogService::new();
        let first = connected(&service).await;
        let second = connected(&service).await;
        let attrs = Attributes {
            lease_seconds: Some(5),
            ..Default::default()
        };
        let stale = acquire(&service, first, &attrs).await;

        let reply = service
            .acquire_stream(second, "ns", "story", &attrs, 1)
            .await
            .unwrap();
        assert_eq!(reply, AcquireReply::Conflict);

        tokio::time::advance(Duration::from_secs(6)).await;

        let reply = service
            .acquire_stream(second, "ns", "story", &attrs, 1)
            .await
            .unwrap();
        assert!(matches!(reply, AcquireReply::Acquired(_)));

        let err = service.append(&stale, Bytes::from("late")).await.unwrap_err();
        assert!(matches!(err, AppendError::InvalidHandle { .. }));
    }

    #[tokio::test]
    async fn test_refused_connect_is_journaled() {
        let service = MemoryLogService::with_faults(FaultPlan {
            refuse_connect: true,
            ..Default::default()
        });
        let client = ClientId::new();

        let err = service
            .connect(client, &ClientConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Connection(_)));
        assert_eq!(service.calls(), vec![ServiceCall::Connect { client }]);
        assert!(!service.is_connected(client));
    }
}
