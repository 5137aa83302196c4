//! Quill session crate - recording-session state machine, cancellation, and
//! status events.
//!
//! One session is one recording -> transcribe -> dispatch cycle. The
//! `SessionManager` spawns a dedicated worker thread per session, hands it a
//! shared `CancellationToken`, and reports lifecycle milestones on the
//! `StatusChannel`. Transitions are validated by a strict state machine:
//! Idle -> Recording -> {Completed, Cancelled} -> Idle.

pub mod manager;
pub mod state;
pub mod status;
pub mod token;

pub use manager::{SessionHandle, SessionManager, Transcriber};
pub use state::{SessionState, StateMachine};
pub use status::{StatusChannel, StatusEvent, StatusKind};
pub use token::CancellationToken;
