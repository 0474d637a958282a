//! Response and event sequencing
//!
//! The transport delivers responses and server-pushed events in whatever
//! order the network produces them. The sequencer reorders both streams so
//! the application observes them in the exact order the state machine
//! produced them, using only the request sequence numbers and event indices
//! carried on each item.
//!
//! The sequencer is not thread safe. It is owned by a single dispatcher
//! task (see the `dispatcher` module); completion closures run on that task
//! and must not call back into the sequencer synchronously.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::metrics;
use crate::protocol::{OperationKind, OperationResponse, PublishMessage};
use crate::session::SessionState;

/// Application-side completion, invoked at most once when the item reaches
/// its ordering slot.
pub type Completion = Box<dyn FnOnce() + Send>;

struct PendingResponse {
    index: u64,
    event_index: u64,
    kind: OperationKind,
    complete: Completion,
}

struct PendingEvent {
    event_index: u64,
    complete: Completion,
}

/// Reorders session responses and events into state machine order.
///
/// Ordering contract: an event is delivered before a response when the
/// event predates the response (`event.event_index < response.event_index`)
/// or when the response's own command triggered the event
/// (`response.event_index == event.event_index`). Responses are delivered
/// in request sequence order; events in event index order.
///
/// Event delivery is best effort. A head-of-line response whose
/// `event_index` is ahead of the event cursor fires without waiting unless
/// the missing event was triggered by the response's own command, in which
/// case the response waits for it.
pub struct ResponseSequencer {
    state: Arc<SessionState>,

    /// Highest request sequence issued.
    request_sequence: u64,

    /// Highest request sequence whose response has been delivered.
    response_sequence: u64,

    /// Highest event index delivered.
    event_index: u64,

    /// Responses waiting for their ordering slot, keyed by sequence.
    responses: HashMap<u64, PendingResponse>,

    /// Events waiting behind in-flight requests, in arrival order.
    events: VecDeque<PendingEvent>,
}

impl ResponseSequencer {
    /// Creates a sequencer resuming from the counters recorded in `state`.
    pub fn new(state: Arc<SessionState>) -> Self {
        let request_sequence = state.command_request();
        ResponseSequencer {
            request_sequence,
            response_sequence: request_sequence,
            event_index: state.event_index(),
            responses: HashMap::new(),
            events: VecDeque::new(),
            state,
        }
    }

    /// Allocates the next request sequence number.
    pub fn next_request(&mut self) -> u64 {
        self.request_sequence += 1;
        self.state.set_command_request(self.request_sequence);
        self.request_sequence
    }

    /// Admits a server-pushed event.
    ///
    /// Events arriving with a causal gap (`previous_index` ahead of every
    /// event this session has observed) are dropped without invoking
    /// `complete`; the server retransmits from its last acked index.
    pub fn sequence_event<F>(&mut self, message: &PublishMessage, complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if message.previous_index > self.last_event_index() {
            log::debug!(
                "session {}: dropping event at index {} with unseen previous index {}",
                self.state.session_id(),
                message.event_index,
                message.previous_index
            );
            metrics::EVENTS_DROPPED.inc();
            return;
        }

        // With no request in flight there is nothing an event could need to
        // be ordered against.
        if self.request_sequence == self.response_sequence {
            self.fire_event(message.event_index, Box::new(complete));
        } else {
            self.events.push_back(PendingEvent {
                event_index: message.event_index,
                complete: Box::new(complete),
            });
            self.complete_responses();
        }
    }

    /// Admits a response for a previously allocated `sequence`.
    ///
    /// Responses for already-delivered or never-allocated sequences are
    /// dropped without invoking `complete`.
    pub fn sequence_response<F>(&mut self, sequence: u64, response: &OperationResponse, complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if sequence <= self.response_sequence {
            log::debug!(
                "session {}: dropping response for delivered sequence {}",
                self.state.session_id(),
                sequence
            );
            metrics::RESPONSES_DROPPED.inc();
            return;
        }
        if sequence > self.request_sequence {
            debug_assert!(
                false,
                "response for unallocated sequence {} (highest issued {})",
                sequence, self.request_sequence
            );
            log::warn!(
                "session {}: dropping response for unallocated sequence {}",
                self.state.session_id(),
                sequence
            );
            metrics::RESPONSES_DROPPED.inc();
            return;
        }
        if self.responses.contains_key(&sequence) {
            debug_assert!(false, "duplicate response for pending sequence {}", sequence);
            log::warn!(
                "session {}: dropping duplicate response for sequence {}",
                self.state.session_id(),
                sequence
            );
            metrics::RESPONSES_DROPPED.inc();
            return;
        }

        let pending = PendingResponse {
            index: response.index(),
            event_index: response.event_index(),
            kind: response.kind(),
            complete: Box::new(complete),
        };

        if sequence == self.response_sequence + 1 {
            match self.try_complete_response(sequence, pending) {
                Ok(()) => self.complete_responses(),
                Err(pending) => {
                    self.responses.insert(sequence, pending);
                }
            }
        } else {
            self.responses.insert(sequence, pending);
        }
    }

    /// Highest request sequence issued so far.
    pub fn request_sequence(&self) -> u64 {
        self.request_sequence
    }

    /// Highest request sequence delivered so far.
    pub fn response_sequence(&self) -> u64 {
        self.response_sequence
    }

    /// Highest event index delivered so far.
    pub fn event_index(&self) -> u64 {
        self.event_index
    }

    /// Number of responses waiting for their ordering slot.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Number of events waiting behind in-flight requests.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Highest event index observed, delivered or still queued. The causal
    /// gap check runs against this rather than the delivered cursor so that
    /// an event chained onto a queued predecessor is not mistaken for a
    /// loss.
    fn last_event_index(&self) -> u64 {
        self.events
            .back()
            .map(|event| event.event_index)
            .unwrap_or(self.event_index)
    }

    /// Completes queued responses in sequence order while possible, then
    /// flushes the event queue once no request remains in flight.
    fn complete_responses(&mut self) {
        loop {
            let next = self.response_sequence + 1;
            let Some(pending) = self.responses.remove(&next) else {
                break;
            };
            if let Err(pending) = self.try_complete_response(next, pending) {
                self.responses.insert(next, pending);
                break;
            }
        }

        if self.request_sequence == self.response_sequence {
            while let Some(event) = self.events.pop_front() {
                self.fire_event(event.event_index, event.complete);
            }
        }
    }

    /// Attempts to deliver the head-of-line response, first delivering
    /// every queued event the response subsumes.
    ///
    /// Returns the record unconsumed when the response must keep waiting:
    /// its command triggered an event at the response's own index and that
    /// event has not been observed yet.
    fn try_complete_response(
        &mut self,
        sequence: u64,
        pending: PendingResponse,
    ) -> Result<(), PendingResponse> {
        if pending.event_index > self.event_index {
            while let Some(head) = self.events.front() {
                if head.event_index > pending.event_index {
                    break;
                }
                let event = self.events.pop_front().unwrap();
                self.fire_event(event.event_index, event.complete);
            }

            if pending.event_index > self.event_index && pending.event_index == pending.index {
                return Err(pending);
            }
        }

        // Counters are published before the closure runs so observers of
        // the session state never see delivery lag, and so a closure panic
        // cannot cause the slot to fire twice.
        self.response_sequence = sequence;
        self.state.set_response_index(pending.index);
        metrics::RESPONSES_SEQUENCED_VEC
            .with_label_values(&[pending.kind.as_str()])
            .inc();
        (pending.complete)();
        Ok(())
    }

    fn fire_event(&mut self, event_index: u64, complete: Completion) {
        // The cursor never moves backwards, even for a retransmitted event.
        self.event_index = self.event_index.max(event_index);
        self.state.set_event_index(event_index);
        metrics::EVENTS_SEQUENCED.inc();
        complete();
    }
}
