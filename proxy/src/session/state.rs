//! Shared session state
//!
//! One `SessionState` exists per open session. It carries the session
//! identity and three monotonically non-decreasing counters that the
//! sequencer publishes to and the keep-alive path acks from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use uuid::Uuid;

/// Identity and progress counters for one client session.
///
/// The counters only move forward: every setter is a `fetch_max`, so a
/// stale writer can never roll a counter back.
#[derive(Debug)]
pub struct SessionState {
    session_id: u64,
    client_id: String,
    service: String,
    timeout: Duration,
    command_request: AtomicU64,
    response_index: AtomicU64,
    event_index: AtomicU64,
}

impl SessionState {
    pub fn new(session_id: u64, service: impl Into<String>, timeout: Duration) -> Self {
        SessionState {
            session_id,
            client_id: Uuid::new_v4().to_string(),
            service: service.into(),
            timeout,
            command_request: AtomicU64::new(0),
            response_index: AtomicU64::new(0),
            event_index: AtomicU64::new(0),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Highest command request sequence issued for this session.
    pub fn command_request(&self) -> u64 {
        self.command_request.load(Ordering::SeqCst)
    }

    pub fn set_command_request(&self, sequence: u64) {
        self.command_request.fetch_max(sequence, Ordering::SeqCst);
    }

    /// Highest state machine index for which a response has been delivered.
    pub fn response_index(&self) -> u64 {
        self.response_index.load(Ordering::SeqCst)
    }

    pub fn set_response_index(&self, index: u64) {
        self.response_index.fetch_max(index, Ordering::SeqCst);
    }

    /// Highest event index delivered to the application.
    pub fn event_index(&self) -> u64 {
        self.event_index.load(Ordering::SeqCst)
    }

    pub fn set_event_index(&self, index: u64) {
        self.event_index.fetch_max(index, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_are_monotonic() {
        let state = SessionState::new(1, "test", Duration::from_secs(5));

        state.set_command_request(3);
        state.set_command_request(2);
        assert_eq!(state.command_request(), 3);

        state.set_response_index(20);
        state.set_response_index(15);
        assert_eq!(state.response_index(), 20);

        state.set_event_index(10);
        state.set_event_index(10);
        assert_eq!(state.event_index(), 10);
    }

    #[test]
    fn test_client_ids_are_unique() {
        let a = SessionState::new(1, "test", Duration::from_secs(5));
        let b = SessionState::new(1, "test", Duration::from_secs(5));
        assert_ne!(a.client_id(), b.client_id());
    }
}
