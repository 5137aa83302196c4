//! OS hotkey facility seam.
//!
//! `GlobalHotkeyBinder` registers combinations system-wide through the
//! `global-hotkey` crate and drains its event receiver. `MockBinder` records
//! every call and replays injected presses, for tests.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};

use quill_core::error::{QuillError, Result};

/// Identifier of one live OS binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u32);

/// Registration and event access for system-wide hotkeys.
pub trait HotkeyBinder: Send + Sync {
    /// Register a combination string (e.g. `"ctrl+shift+space"`).
    fn register(&self, combination: &str) -> Result<BindingId>;

    /// Remove a live binding.
    fn unregister(&self, id: BindingId) -> Result<()>;

    /// Non-blocking poll for the next press event.
    fn try_recv(&self) -> Option<BindingId>;
}

/// Binder backed by the `global-hotkey` crate.
///
/// The manager lives behind the mutex with the id map: it is not `Sync`
/// (the X11 backend talks to a helper thread over a channel sender).
pub struct GlobalHotkeyBinder {
    inner: Mutex<GlobalState>,
}

struct GlobalState {
    manager: GlobalHotKeyManager,
    // Unregistration needs the original HotKey value, not just its id.
    registered: HashMap<u32, HotKey>,
}

impl GlobalHotkeyBinder {
    pub fn new() -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| QuillError::Hotkey(format!("Failed to create hotkey manager: {}", e)))?;
        Ok(Self {
            inner: Mutex::new(GlobalState {
                manager,
                registered: HashMap::new(),
            }),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, GlobalState>> {
        self.inner
            .lock()
            .map_err(|e| QuillError::Hotkey(format!("Binder mutex poisoned: {}", e)))
    }
}

impl HotkeyBinder for GlobalHotkeyBinder {
    fn register(&self, combination: &str) -> Result<BindingId> {
        let hotkey = HotKey::from_str(combination).map_err(|e| {
            QuillError::Hotkey(format!("Failed to parse hotkey '{}': {}", combination, e))
        })?;

        let mut inner = self.lock()?;
        inner.manager.register(hotkey).map_err(|e| {
            QuillError::Hotkey(format!("Failed to register hotkey '{}': {}", combination, e))
        })?;
        inner.registered.insert(hotkey.id(), hotkey);
        tracing::info!(combination = %combination, "Global hotkey registered");
        Ok(BindingId(hotkey.id()))
    }

    fn unregister(&self, id: BindingId) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.registered.remove(&id.0) {
            Some(hotkey) => {
                inner.manager.unregister(hotkey).map_err(|e| {
                    QuillError::Hotkey(format!("Failed to unregister hotkey: {}", e))
                })?;
                tracing::info!(id = id.0, "Global hotkey unregistered");
                Ok(())
            }
            None => Err(QuillError::Hotkey(format!("Unknown binding id {}", id.0))),
        }
    }

    fn try_recv(&self) -> Option<BindingId> {
        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            if event.state == HotKeyState::Pressed {
                return Some(BindingId(event.id));
            }
        }
        None
    }
}

/// Recording binder for tests.
///
/// Hands out sequential ids, tracks the live set, and replays presses pushed
/// with [`MockBinder::press`].
#[derive(Debug, Default)]
pub struct MockBinder {
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u32,
    live: HashMap<u32, String>,
    unregistered: Vec<String>,
    pending: Vec<BindingId>,
}

impl MockBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a press event for a live combination.
    pub fn press(&self, combination: &str) {
        let mut state = self.state.lock().expect("mock mutex poisoned");
        let id = state
            .live
            .iter()
            .find(|(_, combo)| combo.as_str() == combination)
            .map(|(id, _)| BindingId(*id));
        if let Some(id) = id {
            state.pending.push(id);
        }
    }

    /// Combinations currently registered.
    pub fn live_combinations(&self) -> Vec<String> {
        let state = self.state.lock().expect("mock mutex poisoned");
        let mut combos: Vec<String> = state.live.values().cloned().collect();
        combos.sort();
        combos
    }

    /// Combinations that have been unregistered, in order.
    pub fn unregistered_combinations(&self) -> Vec<String> {
        let state = self.state.lock().expect("mock mutex poisoned");
        state.unregistered.clone()
    }
}

impl HotkeyBinder for MockBinder {
    fn register(&self, combination: &str) -> Result<BindingId> {
        let mut state = self.state.lock().expect("mock mutex poisoned");
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, combination.to_string());
        Ok(BindingId(id))
    }

    fn unregister(&self, id: BindingId) -> Result<()> {
        let mut state = self.state.lock().expect("mock mutex poisoned");
        match state.live.remove(&id.0) {
            Some(combination) => {
                state.unregistered.push(combination);
                Ok(())
            }
            None => Err(QuillError::Hotkey(format!("Unknown binding id {}", id.0))),
        }
    }

    fn try_recv(&self) -> Option<BindingId> {
        let mut state = self.state.lock().expect("mock mutex poisoned");
        if state.pending.is_empty() {
            None
        } else {
            Some(state.pending.remove(0))
        }
    }
}
