// Value types shared by the logging-service boundary and the session client

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::LogError;

// ==================================================================================================
// Client configuration
// ==================================================================================================

/// Transport used to reach the logging service portal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Transport {
    #[default]
    OfiSockets,
    OfiTcp,
    InProcess,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::OfiSockets => write!(f, "ofi+sockets"),
            Transport::OfiTcp => write!(f, "ofi+tcp"),
            Transport::InProcess => write!(f, "inproc"),
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ofi+sockets" | "sockets" => Ok(Transport::OfiSockets),
            "ofi+tcp" | "tcp" => Ok(Transport::OfiTcp),
            "inproc" | "memory" => Ok(Transport::InProcess),
            _ => Err(format!("Unknown transport: {}", s)),
        }
    }
}

/// Connection settings for one client session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    /// Lease/heartbeat interval granted to streams acquired by this client
    pub lease_seconds: u64,
    /// Upper bound on the connect handshake
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: Transport::OfiSockets,
            host: "127.0.0.1".to_string(),
            port: 5555,
            lease_seconds: 55,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Portal address, e.g. `ofi+sockets://127.0.0.1:5555`
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}", self.transport, self.host, self.port)
    }
}

// ==================================================================================================
// Attributes
// ==================================================================================================

/// What the service keeps of a stream's events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetentionPolicy {
    #[default]
    KeepAll,
    /// Keep only the newest `n` events
    KeepLatest(usize),
    /// Discard all events once the lease is released
    DropOnRelease,
}

impl std::str::FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "keep_all" => Ok(RetentionPolicy::KeepAll),
            "drop_on_release" => Ok(RetentionPolicy::DropOnRelease),
            _ => match lower.strip_prefix("keep_latest:") {
                Some(n) => n
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(RetentionPolicy::KeepLatest)
                    .ok_or_else(|| format!("keep_latest needs a positive count, got '{}'", n)),
                None => Err(format!("Unknown retention policy: {}", s)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Typed metadata for namespaces and streams.
///
/// Recognized keys: `retention_policy`, `lease_seconds`, `priority`.
/// Anything else is rejected by [`Attributes::from_pairs`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes {
    pub retention_policy: RetentionPolicy,
    /// Overrides the client's lease interval for this stream
    pub lease_seconds: Option<u64>,
    pub priority: Priority,
}

impl Attributes {
    pub const RECOGNIZED_KEYS: &'static [&'static str] =
        &["retention_policy", "lease_seconds", "priority"];

    /// Build attributes from loose key/value pairs, rejecting unknown keys
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, LogError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut attrs = Attributes::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            let invalid = |reason: String| LogError::InvalidAttribute {
                key: key.to_string(),
                reason,
            };

            match key.to_lowercase().as_str() {
                "retention_policy" => attrs.retention_policy = value.parse().map_err(invalid)?,
                "lease_seconds" => {
                    let secs = value
                        .parse::<u64>()
                        .map_err(|e| invalid(e.to_string()))?;
                    if secs == 0 {
                        return Err(invalid("must be greater than zero".to_string()));
                    }
                    attrs.lease_seconds = Some(secs);
                }
                "priority" => attrs.priority = value.parse().map_err(invalid)?,
                _ => return Err(invalid("unknown key".to_string())),
            }
        }

        Ok(attrs)
    }
}

/// Creation flags, carried to the service verbatim
pub type Flags = u32;

// ==================================================================================================
// Statuses and records
// ==================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateStatus {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseStatus {
    Released,
    /// Nothing was held by the caller
    NotAcquired,
    /// The caller holds a different namespace/stream pair
    Mismatch,
}

/// Opaque identity of one connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof of an exclusive stream lease, issued by the service on acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub client: ClientId,
    pub namespace: String,
    pub stream: String,
    pub token: Uuid,
}

/// Service reply to a stream acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireReply {
    Acquired(Lease),
    NotFound,
    Conflict,
}

/// One appended record. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub payload: Bytes,
    /// Logical timestamp assigned by the service
    pub timestamp: u64,
}

/// Acknowledgement of a durable append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub timestamp: u64,
    /// Zero-based position of the event within its stream
    pub position: u64,
}
