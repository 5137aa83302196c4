//! Quill dispatch crate - output emission and top-level orchestration.
//!
//! The `Dispatcher` ties a hotkey press to one full
//! record -> transcribe -> assemble -> complete -> emit cycle, then re-arms
//! the combination unconditionally so the system can never end up stuck
//! un-triggerable.

pub mod app_context;
pub mod dispatcher;
pub mod output;

pub use app_context::AppContext;
pub use dispatcher::{Dispatcher, OutputSinks, Trigger};
pub use output::{
    typewrite, Chime, EnigoKeystrokes, Keystrokes, LoggingSpeaker, MockKeystrokes, SilentChime,
    Speaker, SystemClipboard,
};
