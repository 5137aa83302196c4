//! Session manager: spawns, cancels, and joins recording sessions.
//!
//! One dedicated worker thread per session, at most one session recording at
//! a time. A new start first requests cancellation of any prior active
//! session; cancellation is cooperative, so an in-flight transcription call
//! is never aborted, only its result is discarded once it returns.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use uuid::Uuid;

use quill_core::config::{OutputConfig, TranscriptionConfig};
use quill_core::error::{QuillError, Result};

use crate::state::{SessionState, StateMachine};
use crate::status::{StatusChannel, StatusEvent, StatusKind};
use crate::token::CancellationToken;

/// Speech-to-text engine seam.
///
/// The engine blocks until recording ends (per the configured recording
/// mode) and returns the transcript, `Ok(None)` for an empty capture. It is
/// expected to check `cancel` between units of work and to report progress
/// on `status`.
pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        config: &TranscriptionConfig,
        status: &StatusChannel,
        cancel: &CancellationToken,
    ) -> Result<Option<String>>;
}

/// Handle to one in-flight recording session.
///
/// Owns the worker thread; the result is retrieved through
/// [`SessionManager::join`], which consumes the handle.
pub struct SessionHandle {
    pub id: Uuid,
    state: StateMachine,
    token: CancellationToken,
    worker: JoinHandle<Option<String>>,
}

impl SessionHandle {
    /// Current lifecycle state of this session.
    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// A clone of this session's cancellation token.
    ///
    /// The token outlives `join`, so the emission phase can keep checking it
    /// after the worker has finished.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

struct ActiveSession {
    id: Uuid,
    token: CancellationToken,
}

/// Owns the recording-session lifecycle.
pub struct SessionManager {
    transcription: TranscriptionConfig,
    output: OutputConfig,
    transcriber: Arc<dyn Transcriber>,
    status: StatusChannel,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(
        transcription: TranscriptionConfig,
        output: OutputConfig,
        transcriber: Arc<dyn Transcriber>,
        status: StatusChannel,
    ) -> Self {
        Self {
            transcription,
            output,
            transcriber,
            status,
            active: Mutex::new(None),
        }
    }

    /// The status channel sessions report on.
    pub fn status(&self) -> &StatusChannel {
        &self.status
    }

    /// Start a new recording session on a dedicated worker thread.
    ///
    /// Requests cancellation of any prior active session, drains stale
    /// status events, publishes `Recording`, and spawns the worker with the
    /// session's cancellation token.
    pub fn start_session(&self) -> Result<SessionHandle> {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let state = StateMachine::new();

        {
            let mut active = self
                .active
                .lock()
                .map_err(|e| QuillError::Session(format!("Active-session mutex poisoned: {}", e)))?;
            if let Some(prior) = active.take() {
                tracing::debug!(session_id = %prior.id, "Cancelling prior session before restart");
                prior.token.cancel();
            }
            *active = Some(ActiveSession {
                id,
                token: token.clone(),
            });
        }

        self.status.drain();
        self.status
            .publish(StatusEvent::new(StatusKind::Recording, "Recording..."));
        state.transition(SessionState::Recording)?;
        tracing::info!(session_id = %id, "Recording session started");

        let worker_state = state.clone();
        let worker_token = token.clone();
        let worker_status = self.status.clone();
        let transcriber = Arc::clone(&self.transcriber);
        let transcription = self.transcription.clone();
        let output = self.output.clone();

        let worker = std::thread::spawn(move || {
            run_worker(
                id,
                &transcriber,
                &transcription,
                &output,
                &worker_status,
                &worker_token,
                &worker_state,
            )
        });

        Ok(SessionHandle {
            id,
            state,
            token,
            worker,
        })
    }

    /// Request cancellation of a session. Sets the shared flag, publishes a
    /// `Cancel` event, and returns immediately.
    pub fn cancel(&self, handle: &SessionHandle) {
        tracing::info!(session_id = %handle.id, "Cancellation requested");
        handle.token.cancel();
        self.status
            .publish(StatusEvent::new(StatusKind::Cancel, "Cancelled"));
    }

    /// Request cancellation of whichever session started most recently.
    ///
    /// The token is kept around after the worker finishes so that a late
    /// cancel still truncates the emission phase.
    pub fn cancel_active(&self) {
        let active = match self.active.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if let Some(ref session) = *active {
            tracing::info!(session_id = %session.id, "Cancellation requested");
            session.token.cancel();
            self.status
                .publish(StatusEvent::new(StatusKind::Cancel, "Cancelled"));
        }
    }

    /// Block until the worker thread terminates and return its result.
    ///
    /// `None` means failure, empty capture, or cancellation. Consuming the
    /// result moves the session back to Idle.
    pub fn join(&self, handle: SessionHandle) -> Option<String> {
        let SessionHandle {
            id, state, worker, ..
        } = handle;

        let result = match worker.join() {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(session_id = %id, "Session worker panicked");
                state.reset();
                return None;
            }
        };

        if let Err(e) = state.transition(SessionState::Idle) {
            tracing::warn!(session_id = %id, error = %e, "Session did not reach a terminal state");
            state.reset();
        }
        result
    }
}

fn run_worker(
    id: Uuid,
    transcriber: &Arc<dyn Transcriber>,
    transcription: &TranscriptionConfig,
    output: &OutputConfig,
    status: &StatusChannel,
    token: &CancellationToken,
    state: &StateMachine,
) -> Option<String> {
    let transcript = match transcriber.transcribe(transcription, status, token) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "Transcription failed");
            status.publish(StatusEvent::new(StatusKind::Error, e.to_string()));
            None
        }
    };

    // Checkpoint: a result that arrives after cancellation is not consumed.
    if token.is_cancelled() {
        if let Err(e) = state.transition(SessionState::Cancelled) {
            tracing::debug!(session_id = %id, error = %e, "Cancel transition skipped");
        }
        tracing::info!(session_id = %id, "Session cancelled");
        return None;
    }

    if let Err(e) = state.transition(SessionState::Completed) {
        tracing::warn!(session_id = %id, error = %e, "Completion transition failed");
    }

    let text = transcript
        .map(|t| post_process(&t, output))
        .filter(|t| !t.is_empty());

    match &text {
        Some(t) => {
            tracing::info!(session_id = %id, chars = t.len(), "Session completed");
            if output.print_to_terminal {
                tracing::info!(session_id = %id, transcript = %t, "Transcription");
            }
        }
        None => tracing::info!(session_id = %id, "Session completed with no result"),
    }
    text
}

/// Apply the configured transcript touch-ups.
fn post_process(text: &str, output: &OutputConfig) -> String {
    let mut text = text.trim().to_string();
    if output.remove_trailing_period {
        if let Some(stripped) = text.strip_suffix('.') {
            text = stripped.to_string();
        }
    }
    if output.remove_capitalization {
        text = text.to_lowercase();
    }
    if output.add_trailing_space {
        text.push(' ');
    }
    text
}

// =============================================================================
// Tests
// =============================================================================
