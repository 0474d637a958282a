//! Raft client proxy
//!
//! Client-side plumbing for talking to a Raft-replicated state machine:
//! sessions with monotonic progress counters, a sequencer that delivers
//! responses and server-pushed events in state machine order, a framed TCP
//! protocol client, and file-based snapshot storage.
//!
//! The centerpiece is [`session::ResponseSequencer`]: the transport may
//! deliver responses out of request order and events before or after the
//! responses that relate to them, and the sequencer linearizes all of it
//! against the request sequence and the event index so the application
//! observes exactly the order the state machine produced.

pub mod config;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod snapshot;

pub use config::ProxyConfig;
pub use protocol::{OperationResponse, ProtocolClient, ProtocolError, PublishMessage};
pub use session::{ResponseSequencer, SessionDispatcher, SessionState};
pub use snapshot::{SnapshotReader, SnapshotStore, SnapshotWriter};
