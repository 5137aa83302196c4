//! Recording-session state machine with thread-safe transitions.
//!
//! Enforces valid state transitions for the session lifecycle:
//! - Idle -> Recording (session started)
//! - Recording -> Completed (engine returned, result available or empty)
//! - Recording -> Cancelled (explicit cancel before completion)
//! - Completed -> Idle (result consumed)
//! - Cancelled -> Idle (result consumed)

use std::fmt;
use std::sync::{Arc, Mutex};

use quill_core::error::QuillError;

/// Lifecycle state of one recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No work in progress, or the result has been consumed.
    Idle,
    /// The capture worker is running.
    Recording,
    /// Cancellation was requested before the session completed.
    Cancelled,
    /// The engine returned; the result (possibly empty) awaits consumption.
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Recording => write!(f, "Recording"),
            SessionState::Cancelled => write!(f, "Cancelled"),
            SessionState::Completed => write!(f, "Completed"),
        }
    }
}

impl SessionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Recording)
                | (SessionState::Recording, SessionState::Completed)
                | (SessionState::Recording, SessionState::Cancelled)
                | (SessionState::Completed, SessionState::Idle)
                | (SessionState::Cancelled, SessionState::Idle)
        )
    }
}

/// Thread-safe state machine shared between a session handle and its worker.
///
/// All transitions are validated before being applied, returning an error if
/// the requested transition is not permitted from the current state.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<SessionState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Idle)
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: SessionState) -> Result<(), QuillError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| QuillError::Session(format!("State mutex poisoned: {}", e)))?;
        if state.can_transition_to(&target) {
            tracing::debug!("Session state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(QuillError::Session(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }

    /// Force the state machine back to Idle (error recovery).
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            tracing::warn!("Session state machine reset to Idle from {}", *state);
            *state = SessionState::Idle;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
