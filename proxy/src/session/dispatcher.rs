//! Single-task sequencer ownership
//!
//! The sequencer itself performs no locking, so it must be driven from one
//! task. `SessionDispatcher` moves a sequencer into a spawned task and
//! funnels every operation through a channel: admissions and their
//! completion closures execute strictly in channel order on the owning
//! task. A completion that wants to issue a follow-up request goes back
//! through the channel, so synchronous re-entry is impossible by
//! construction.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::protocol::{OperationResponse, PublishMessage};
use crate::session::sequencer::{Completion, ResponseSequencer};
use crate::session::SessionState;

const OP_CHANNEL_SIZE: usize = 1024;

enum SequencerOp {
    NextRequest {
        reply: oneshot::Sender<u64>,
    },
    Response {
        sequence: u64,
        response: OperationResponse,
        complete: Completion,
    },
    Event {
        message: PublishMessage,
        complete: Completion,
    },
}

/// Cloneable handle to a sequencer pinned to its own task.
///
/// The task ends when every handle has been dropped; closures still queued
/// at that point are discarded.
#[derive(Clone)]
pub struct SessionDispatcher {
    ops: mpsc::Sender<SequencerOp>,
}

impl SessionDispatcher {
    /// Spawns the owning task with a fresh sequencer resuming from `state`.
    pub fn spawn(state: Arc<SessionState>) -> Self {
        let (ops_tx, mut ops_rx) = mpsc::channel(OP_CHANNEL_SIZE);
        let mut sequencer = ResponseSequencer::new(state);

        tokio::spawn(async move {
            while let Some(op) = ops_rx.recv().await {
                match op {
                    SequencerOp::NextRequest { reply } => {
                        let _ = reply.send(sequencer.next_request());
                    }
                    SequencerOp::Response {
                        sequence,
                        response,
                        complete,
                    } => sequencer.sequence_response(sequence, &response, complete),
                    SequencerOp::Event { message, complete } => {
                        sequencer.sequence_event(&message, complete)
                    }
                }
            }
        });

        SessionDispatcher { ops: ops_tx }
    }

    /// Allocates the next request sequence. Returns `None` once the
    /// dispatcher task has shut down.
    pub async fn next_request(&self) -> Option<u64> {
        let (tx, rx) = oneshot::channel();
        self.ops
            .send(SequencerOp::NextRequest { reply: tx })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Admits a response for sequencing on the owning task.
    pub async fn sequence_response<F>(&self, sequence: u64, response: OperationResponse, complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self
            .ops
            .send(SequencerOp::Response {
                sequence,
                response,
                complete: Box::new(complete),
            })
            .await;
    }

    /// Admits a server-pushed event for sequencing on the owning task.
    pub async fn sequence_event<F>(&self, message: PublishMessage, complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self
            .ops
            .send(SequencerOp::Event {
                message,
                complete: Box::new(complete),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandResponse, ResponseStatus};
    use std::time::Duration;

    fn command(index: u64, event_index: u64) -> OperationResponse {
        OperationResponse::Command(CommandResponse {
            status: ResponseStatus::Ok,
            index,
            event_index,
            payload: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_operations_complete_in_order() {
        let state = Arc::new(SessionState::new(1, "test", Duration::from_secs(5)));
        let dispatcher = SessionDispatcher::spawn(state.clone());

        let sequence = dispatcher.next_request().await.unwrap();
        assert_eq!(sequence, 1);

        let (event_tx, event_rx) = oneshot::channel();
        dispatcher
            .sequence_event(
                PublishMessage {
                    session_id: 1,
                    event_index: 2,
                    previous_index: 0,
                    events: Vec::new(),
                },
                move || {
                    let _ = event_tx.send(());
                },
            )
            .await;

        let (response_tx, response_rx) = oneshot::channel();
        dispatcher
            .sequence_response(sequence, command(2, 2), move || {
                let _ = response_tx.send(());
            })
            .await;

        event_rx.await.unwrap();
        response_rx.await.unwrap();
        assert_eq!(state.response_index(), 2);
        assert_eq!(state.event_index(), 2);
    }

    // A completion can issue the follow-up request through the handle
    // without deadlocking the owning task.
    #[tokio::test]
    async fn test_completion_reenters_through_channel() {
        let state = Arc::new(SessionState::new(1, "test", Duration::from_secs(5)));
        let dispatcher = SessionDispatcher::spawn(state);

        let sequence = dispatcher.next_request().await.unwrap();

        let (done_tx, done_rx) = oneshot::channel();
        let handle = dispatcher.clone();
        dispatcher
            .sequence_response(sequence, command(1, 0), move || {
                tokio::spawn(async move {
                    let next = handle.next_request().await.unwrap();
                    let _ = done_tx.send(next);
                });
            })
            .await;

        assert_eq!(done_rx.await.unwrap(), sequence + 1);
    }
}
