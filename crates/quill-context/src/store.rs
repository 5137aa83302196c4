//! Persisted key/value store backing context assembly and hotkey actions.
//!
//! A flat string-to-string mapping kept in a JSON file. Every mutation is
//! flushed immediately; there is no batching. The file is single-writer:
//! running more than one process instance against it is unsupported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use quill_core::error::{QuillError, Result};

/// String-to-string mapping persisted as JSON.
pub struct KeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore {
    /// Open a store backed by `path`, seeding from the file if it exists.
    ///
    /// A missing or malformed file is treated as an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Truncate the store to `{}`, in memory and on disk.
    ///
    /// Called once at process start so each run begins with known-clean data.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.lock()?;
        entries.clear();
        self.flush(&entries)
    }

    /// Insert or replace one entry and flush. Non-destructive: every other
    /// entry is left unchanged.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(key.into(), value.into());
        self.flush(&entries)
    }

    /// Look up one entry.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().ok().and_then(|e| e.get(key).cloned())
    }

    /// A snapshot of the whole mapping.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The mapping serialized as compact JSON, for system framing.
    pub fn serialized(&self) -> String {
        let snapshot = self.snapshot();
        serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| QuillError::Store(format!("Store mutex poisoned: {}", e)))
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed data file; starting empty");
                BTreeMap::new()
            }
        },
        Err(_) => BTreeMap::new(),
    }
}
