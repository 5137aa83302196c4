//! Quill hotkey crate - OS hotkey binding and the dynamic hotkey registry.
//!
//! The registry owns every OS-level binding. Rebinding a combination is an
//! atomic remove-then-add inside the registry, never left to callers, so a
//! stale handler can never stay live after its combination is reused.

pub mod binder;
pub mod registry;

pub use binder::{BindingId, GlobalHotkeyBinder, HotkeyBinder, MockBinder};
pub use registry::{ActionType, HotkeyBinding, HotkeyRegistry, UpdateOutcome};
