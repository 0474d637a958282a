//! Client session protocol
//!
//! This module defines the wire messages exchanged between the proxy and the
//! cluster, the length-prefixed framing they travel in, and the TCP client
//! that correlates requests with responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod client;
pub mod frame;

pub use client::ProtocolClient;

/// Errors produced by the protocol layer
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {len} bytes exceeds maximum frame length")]
    FrameTooLarge { len: usize },
    #[error("request timed out")]
    Timeout,
    #[error("connection closed")]
    Closed,
}

/// Completion status carried by every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Distinguishes the two operation kinds a session can submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Command,
    Query,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Command => "command",
            OperationKind::Query => "query",
        }
    }
}

/// Response to a command submitted through the session.
///
/// `index` is the log index at which the command was applied. `event_index`
/// is the highest event index the server had published to this session when
/// the response was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: ResponseStatus,
    pub index: u64,
    pub event_index: u64,
    pub payload: Vec<u8>,
}

/// Response to a query submitted through the session.
///
/// Queries do not advance the state machine; `index` is the last applied
/// index the query observed, or 0 if it observed none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: ResponseStatus,
    pub index: u64,
    pub event_index: u64,
    pub payload: Vec<u8>,
}

/// Tagged union over the two operation response kinds.
///
/// The sequencer reads only `index`, `event_index` and the kind tag; the
/// payload is opaque to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationResponse {
    Command(CommandResponse),
    Query(QueryResponse),
}

impl OperationResponse {
    pub fn status(&self) -> ResponseStatus {
        match self {
            OperationResponse::Command(response) => response.status,
            OperationResponse::Query(response) => response.status,
        }
    }

    pub fn index(&self) -> u64 {
        match self {
            OperationResponse::Command(response) => response.index,
            OperationResponse::Query(response) => response.index,
        }
    }

    pub fn event_index(&self) -> u64 {
        match self {
            OperationResponse::Command(response) => response.event_index,
            OperationResponse::Query(response) => response.event_index,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OperationResponse::Command(_) => OperationKind::Command,
            OperationResponse::Query(_) => OperationKind::Query,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            OperationResponse::Command(response) => &response.payload,
            OperationResponse::Query(response) => &response.payload,
        }
    }
}

/// Server-pushed state machine events.
///
/// `previous_index` is the event index the server published immediately
/// before this message; the sequencer uses it to detect lost events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishMessage {
    pub session_id: u64,
    pub event_index: u64,
    pub previous_index: u64,
    pub events: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenSessionRequest {
    pub client_id: String,
    pub service: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenSessionResponse {
    pub status: ResponseStatus,
    pub session_id: u64,
    pub timeout_ms: u64,
}

/// Keep-alive; acks the session counters so the server can release
/// delivered results and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepAliveRequest {
    pub session_id: u64,
    pub command_sequence: u64,
    pub event_index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepAliveResponse {
    pub status: ResponseStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub session_id: u64,
    pub sequence: u64,
    pub operation: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub session_id: u64,
    pub sequence: u64,
    pub index: u64,
    pub operation: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseSessionRequest {
    pub session_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseSessionResponse {
    pub status: ResponseStatus,
}

/// Union of every request a client can send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionRequest {
    OpenSession(OpenSessionRequest),
    KeepAlive(KeepAliveRequest),
    Command(CommandRequest),
    Query(QueryRequest),
    CloseSession(CloseSessionRequest),
}

/// Union of every reply a server can send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionResponse {
    OpenSession(OpenSessionResponse),
    KeepAlive(KeepAliveResponse),
    Operation(OperationResponse),
    CloseSession(CloseSessionResponse),
}

/// Client-to-server envelope; `id` correlates the eventual reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub id: u64,
    pub request: SessionRequest,
}

/// Server-to-client envelope. Publishes are unsolicited and carry no
/// correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    Reply { id: u64, response: SessionResponse },
    Publish(PublishMessage),
}
