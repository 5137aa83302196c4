//! Clipboard access seam.
//!
//! The OS clipboard is an opaque primitive to this crate; the real
//! implementation lives with the other output primitives.

use std::sync::Mutex;

use quill_core::error::{QuillError, Result};

/// Read/write access to the system clipboard.
pub trait ClipboardAccess: Send + Sync {
    fn read(&self) -> Result<String>;
    fn write(&self, text: &str) -> Result<()>;
}

/// In-memory clipboard for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    content: Mutex<String>,
}

impl MemoryClipboard {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(content.into()),
        }
    }
}

impl ClipboardAccess for MemoryClipboard {
    fn read(&self) -> Result<String> {
        self.content
            .lock()
            .map(|c| c.clone())
            .map_err(|e| QuillError::Output(format!("Clipboard mutex poisoned: {}", e)))
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut content = self
            .content
            .lock()
            .map_err(|e| QuillError::Output(format!("Clipboard mutex poisoned: {}", e)))?;
        *content = text.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_clipboard_roundtrip() {
        let clipboard = MemoryClipboard::new("initial");
        assert_eq!(clipboard.read().unwrap(), "initial");
        clipboard.write("replaced").unwrap();
        assert_eq!(clipboard.read().unwrap(), "replaced");
    }
}
