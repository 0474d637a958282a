//! Session management
//!
//! A session binds a client to the replicated state machine. This module
//! holds the shared session state (identity plus progress counters), the
//! response/event sequencer, and the dispatcher that pins one sequencer to
//! one task.

pub mod dispatcher;
pub mod sequencer;
pub mod state;

pub use dispatcher::SessionDispatcher;
pub use sequencer::{Completion, ResponseSequencer};
pub use state::SessionState;
