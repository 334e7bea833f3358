// Session-scoped client for the event-logging service
// Namespaces ("chronicles") hold streams ("stories") of append-only events

mod handle;
mod service;
mod session;
pub mod types;

pub use handle::StreamHandle;
pub use service::{FaultPlan, LogService, MemoryLogService, ServiceCall};
pub use session::{AcquireOutcome, Session, SessionState};
pub use types::{
    Ack, Attributes, ClientConfig, CreateStatus, Event, Flags, ReleaseStatus, RetentionPolicy,
    Transport,
};
