//! Status-event channel between the session worker and its listeners.
//!
//! A single logical FIFO queue. Producers are the session worker and cancel
//! callers; consumers are the on-screen status indicator and the dispatcher,
//! which drains stale events before every new cycle so a fresh listener never
//! observes leftovers from a previous session.

use serde::{Deserialize, Serialize};

/// Kind of lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Recording,
    Transcribing,
    Cancel,
    Idle,
    Error,
}

/// One lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub detail: String,
}

impl StatusEvent {
    pub fn new(kind: StatusKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Unbounded FIFO event queue.
///
/// Cloning yields another handle to the same queue, so the worker thread and
/// the listeners can each hold one. Within a session, events are observed by
/// a single consumer in publish order.
#[derive(Debug, Clone)]
pub struct StatusChannel {
    tx: crossbeam_channel::Sender<StatusEvent>,
    rx: crossbeam_channel::Receiver<StatusEvent>,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusChannel {
    /// Create a new empty channel.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Enqueue an event. Never blocks.
    pub fn publish(&self, event: StatusEvent) {
        // Send only fails when every receiver is gone, which cannot happen
        // while this channel half-owns one.
        let _ = self.tx.send(event);
    }

    /// Remove and return the oldest queued event, if any. Never blocks.
    pub fn try_poll(&self) -> Option<StatusEvent> {
        self.rx.try_recv().ok()
    }

    /// Empty the queue. Idempotent and non-blocking; returns the number of
    /// events discarded.
    pub fn drain(&self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
