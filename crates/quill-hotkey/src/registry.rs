//! Dynamic hotkey registry with durable definitions.
//!
//! Named bindings map a combination to a clipboard-driven action. The
//! registry is the only owner of OS-level bindings: every registration goes
//! through an atomic remove-then-add so re-registering a combination can
//! never leave a stale handler live. Definitions are rewritten wholesale to
//! the backing file on every mutation and seeded from it at construction;
//! only an explicit `reset` empties them.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use quill_core::error::{QuillError, Result};

use crate::binder::{BindingId, HotkeyBinder};

/// What a dynamic hotkey does with its completion response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Persist the response into the key/value store under the hotkey name.
    Json,
    /// Type the response out.
    Print,
}

/// One user-defined hotkey. The unique name is the registry map key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyBinding {
    pub combination: String,
    pub post_processing: Option<String>,
    pub action: ActionType,
}

/// Result of an update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// Unknown name; nothing was created or modified.
    NotFound,
}

struct Inner {
    bindings: BTreeMap<String, HotkeyBinding>,
    /// Live OS bindings keyed by combination string.
    os_bindings: HashMap<String, BindingId>,
}

/// Registry of named hotkeys plus the built-in trigger combinations.
pub struct HotkeyRegistry {
    binder: Arc<dyn HotkeyBinder>,
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl HotkeyRegistry {
    /// Open the registry backed by `path`, seeding the working copy from the
    /// persisted definitions and re-registering their combinations.
    ///
    /// A missing or malformed file seeds an empty registry. Definitions whose
    /// combination fails to register are kept on file but logged.
    pub fn open(path: impl Into<PathBuf>, binder: Arc<dyn HotkeyBinder>) -> Self {
        let path = path.into();
        let bindings = load_bindings(&path);
        let registry = Self {
            binder,
            path,
            inner: Mutex::new(Inner {
                bindings: BTreeMap::new(),
                os_bindings: HashMap::new(),
            }),
        };

        if let Ok(mut inner) = registry.inner.lock() {
            for (name, binding) in bindings {
                if let Err(e) = registry.bind_locked(&mut inner, &binding.combination) {
                    tracing::warn!(name = %name, error = %e, "Failed to re-register persisted hotkey");
                }
                inner.bindings.insert(name, binding);
            }
        }
        registry
    }

    /// Create or overwrite a named hotkey. Last write wins; no merge.
    ///
    /// Binds the combination at the OS level as a side effect. When the name
    /// already existed with a different combination, the old OS binding is
    /// removed first.
    pub fn create(
        &self,
        name: &str,
        combination: &str,
        post_processing: Option<&str>,
        action: ActionType,
    ) -> Result<()> {
        let mut inner = self.lock()?;

        if let Some(previous) = inner.bindings.get(name).cloned() {
            if previous.combination != combination {
                self.unbind_locked(&mut inner, &previous.combination);
            }
        }
        self.bind_locked(&mut inner, combination)?;

        inner.bindings.insert(
            name.to_string(),
            HotkeyBinding {
                combination: combination.to_string(),
                post_processing: post_processing
                    .filter(|p| !p.is_empty())
                    .map(|p| p.to_string()),
                action,
            },
        );
        self.save_locked(&inner)?;
        tracing::info!(name = %name, combination = %combination, "Hotkey created");
        Ok(())
    }

    /// Update fields of an existing hotkey.
    ///
    /// An unknown name is a no-op reported as `NotFound`; it never creates a
    /// partial binding. A combination change rebinds at the OS level.
    pub fn update(
        &self,
        name: &str,
        combination: Option<&str>,
        post_processing: Option<&str>,
        action: Option<ActionType>,
    ) -> Result<UpdateOutcome> {
        let mut inner = self.lock()?;

        let Some(current) = inner.bindings.get(name).cloned() else {
            tracing::debug!(name = %name, "Update for unknown hotkey ignored");
            return Ok(UpdateOutcome::NotFound);
        };

        let mut updated = current.clone();
        if let Some(combination) = combination {
            updated.combination = combination.to_string();
        }
        if let Some(post_processing) = post_processing {
            updated.post_processing = if post_processing.is_empty() {
                None
            } else {
                Some(post_processing.to_string())
            };
        }
        if let Some(action) = action {
            updated.action = action;
        }

        if updated.combination != current.combination {
            self.unbind_locked(&mut inner, &current.combination);
            self.bind_locked(&mut inner, &updated.combination)?;
        }

        inner.bindings.insert(name.to_string(), updated);
        self.save_locked(&inner)?;
        tracing::info!(name = %name, "Hotkey updated");
        Ok(UpdateOutcome::Updated)
    }

    /// Snapshot of every named hotkey.
    pub fn list(&self) -> BTreeMap<String, HotkeyBinding> {
        self.lock().map(|i| i.bindings.clone()).unwrap_or_default()
    }

    /// Look up one named hotkey.
    pub fn get(&self, name: &str) -> Option<HotkeyBinding> {
        self.lock().ok().and_then(|i| i.bindings.get(name).cloned())
    }

    /// Bind a combination that is not tied to a named hotkey (built-in
    /// triggers). Atomic remove-then-add like every other registration.
    pub fn bind_combination(&self, combination: &str) -> Result<()> {
        let mut inner = self.lock()?;
        self.bind_locked(&mut inner, combination)
    }

    /// Re-arm a combination: remove the OS binding and add it back.
    ///
    /// Called by the dispatcher after every cycle, in all outcomes, so a
    /// combination can never end up stuck un-triggerable.
    pub fn rearm(&self, combination: &str) -> Result<()> {
        let mut inner = self.lock()?;
        self.unbind_locked(&mut inner, combination);
        self.bind_locked(&mut inner, combination)
    }

    /// The combination a press event belongs to.
    pub fn combination_for(&self, id: BindingId) -> Option<String> {
        self.lock().ok().and_then(|inner| {
            inner
                .os_bindings
                .iter()
                .find(|(_, bound)| **bound == id)
                .map(|(combo, _)| combo.clone())
        })
    }

    /// The named hotkey registered for a combination, if any.
    pub fn binding_for_combination(&self, combination: &str) -> Option<(String, HotkeyBinding)> {
        self.lock().ok().and_then(|inner| {
            inner
                .bindings
                .iter()
                .find(|(_, b)| b.combination == combination)
                .map(|(name, b)| (name.clone(), b.clone()))
        })
    }

    /// Explicitly clear every named hotkey, on disk and at the OS level.
    ///
    /// Built-in trigger combinations bound through `bind_combination` stay
    /// live. This is the only operation that empties the definitions file.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.lock()?;
        let combos: Vec<String> = inner
            .bindings
            .values()
            .map(|b| b.combination.clone())
            .collect();
        for combo in combos {
            self.unbind_locked(&mut inner, &combo);
        }
        inner.bindings.clear();
        self.save_locked(&inner)?;
        tracing::info!("Hotkey registry reset");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| QuillError::Hotkey(format!("Registry mutex poisoned: {}", e)))
    }

    /// Register a combination, removing any previous OS binding for the same
    /// string first so duplicate handlers can never stack up.
    fn bind_locked(&self, inner: &mut Inner, combination: &str) -> Result<()> {
        if let Some(old) = inner.os_bindings.remove(combination) {
            if let Err(e) = self.binder.unregister(old) {
                tracing::warn!(combination = %combination, error = %e, "Stale binding removal failed");
            }
        }
        let id = self.binder.register(combination)?;
        inner.os_bindings.insert(combination.to_string(), id);
        Ok(())
    }

    fn unbind_locked(&self, inner: &mut Inner, combination: &str) {
        if let Some(id) = inner.os_bindings.remove(combination) {
            if let Err(e) = self.binder.unregister(id) {
                tracing::warn!(combination = %combination, error = %e, "Unbind failed");
            }
        }
    }

    fn save_locked(&self, inner: &Inner) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&inner.bindings)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn load_bindings(path: &Path) -> BTreeMap<String, HotkeyBinding> {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(bindings) => bindings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed hotkeys file; starting empty");
                BTreeMap::new()
            }
        },
        Err(_) => BTreeMap::new(),
    }
}

// =============================================================================
// Tests
// =============================================================================
