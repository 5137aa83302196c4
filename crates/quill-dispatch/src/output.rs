//! Output primitives: simulated keystrokes, clipboard, speech, and the
//! completion chime.
//!
//! Each primitive sits behind a trait so the dispatcher can be exercised
//! without touching the OS. The character-by-character `typewrite` loop
//! lives here too; it re-checks the session's cancellation token before
//! every character, so a cancelled session truncates emission immediately
//! after the in-flight character.

use std::sync::Mutex;
use std::time::Duration;

use enigo::{Enigo, Keyboard, Settings};

use quill_core::error::{QuillError, Result};
use quill_session::CancellationToken;

use quill_context::clipboard::ClipboardAccess;

/// Keystroke simulation seam.
pub trait Keystrokes: Send + Sync {
    /// Emit one character into the focused application.
    fn tap(&self, ch: char) -> Result<()>;
}

/// Keystroke simulation backed by `enigo`.
pub struct EnigoKeystrokes {
    inner: Mutex<Enigo>,
}

impl EnigoKeystrokes {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| QuillError::Output(format!("Failed to initialize keystrokes: {}", e)))?;
        Ok(Self {
            inner: Mutex::new(enigo),
        })
    }
}

impl Keystrokes for EnigoKeystrokes {
    fn tap(&self, ch: char) -> Result<()> {
        let mut enigo = self
            .inner
            .lock()
            .map_err(|e| QuillError::Output(format!("Keystroke mutex poisoned: {}", e)))?;
        enigo
            .text(&ch.to_string())
            .map_err(|e| QuillError::Output(format!("Keystroke failed: {}", e)))
    }
}

/// Recording keystroke sink for tests.
#[derive(Debug, Default)]
pub struct MockKeystrokes {
    typed: Mutex<String>,
}

impl MockKeystrokes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything typed so far.
    pub fn typed(&self) -> String {
        self.typed.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl Keystrokes for MockKeystrokes {
    fn tap(&self, ch: char) -> Result<()> {
        let mut typed = self
            .typed
            .lock()
            .map_err(|e| QuillError::Output(format!("Mock mutex poisoned: {}", e)))?;
        typed.push(ch);
        Ok(())
    }
}

/// System clipboard backed by `arboard`.
///
/// A fresh OS handle per call; `arboard` handles are cheap and not `Sync`.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        Self
    }
}

impl ClipboardAccess for SystemClipboard {
    fn read(&self) -> Result<String> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| QuillError::Output(format!("Clipboard unavailable: {}", e)))?;
        clipboard
            .get_text()
            .map_err(|e| QuillError::Output(format!("Clipboard read failed: {}", e)))
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| QuillError::Output(format!("Clipboard unavailable: {}", e)))?;
        clipboard
            .set_text(text)
            .map_err(|e| QuillError::Output(format!("Clipboard write failed: {}", e)))
    }
}

/// Speech output seam. The speech engine itself is an external collaborator.
pub trait Speaker: Send + Sync {
    fn say(&self, text: &str) -> Result<()>;
}

/// Speaker that only logs; used when no speech engine is wired in.
#[derive(Debug, Default)]
pub struct LoggingSpeaker;

impl Speaker for LoggingSpeaker {
    fn say(&self, text: &str) -> Result<()> {
        tracing::info!(chars = text.len(), "Speaking response (no speech engine wired)");
        Ok(())
    }
}

/// Completion-sound seam. `play_blocking` returns only once the sound has
/// finished, which deliberately holds off re-arming.
pub trait Chime: Send + Sync {
    fn play_blocking(&self);
}

/// Chime that only logs.
#[derive(Debug, Default)]
pub struct SilentChime;

impl Chime for SilentChime {
    fn play_blocking(&self) {
        tracing::debug!("Completion chime");
    }
}

/// Type `text` one character at a time, pausing `interval` between
/// characters and re-checking `token` before each one.
///
/// Returns the number of characters emitted, which is less than the input
/// length when the session was cancelled mid-emission.
pub async fn typewrite(
    text: &str,
    interval: Duration,
    token: &CancellationToken,
    keys: &dyn Keystrokes,
) -> Result<usize> {
    let mut emitted = 0;
    for ch in text.chars() {
        if token.is_cancelled() {
            tracing::info!(emitted, total = text.chars().count(), "Emission truncated by cancel");
            break;
        }
        keys.tap(ch)?;
        emitted += 1;
        tokio::time::sleep(interval).await;
    }
    Ok(emitted)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_typewrite_emits_all_characters() {
        let keys = MockKeystrokes::new();
        let token = CancellationToken::new();
        let emitted = typewrite("hi there", Duration::ZERO, &token, &keys)
            .await
            .unwrap();
        assert_eq!(emitted, 8);
        assert_eq!(keys.typed(), "hi there");
    }

    #[tokio::test]
    async fn test_typewrite_cancelled_before_start() {
        let keys = MockKeystrokes::new();
        let token = CancellationToken::new();
        token.cancel();
        let emitted = typewrite("never", Duration::ZERO, &token, &keys)
            .await
            .unwrap();
        assert_eq!(emitted, 0);
        assert!(keys.typed().is_empty());
    }

    #[tokio::test]
    async fn test_typewrite_truncates_mid_emission() {
        let keys = std::sync::Arc::new(MockKeystrokes::new());
        let token = CancellationToken::new();

        let canceller_token = token.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller_token.cancel();
        });

        let long_text = "x".repeat(10_000);
        let emitted = typewrite(&long_text, Duration::from_millis(1), &token, keys.as_ref())
            .await
            .unwrap();
        canceller.await.unwrap();

        assert!(emitted < 10_000);
        assert_eq!(keys.typed().len(), emitted);
    }

    #[tokio::test]
    async fn test_typewrite_empty_text() {
        let keys = MockKeystrokes::new();
        let token = CancellationToken::new();
        let emitted = typewrite("", Duration::ZERO, &token, &keys).await.unwrap();
        assert_eq!(emitted, 0);
    }

    #[test]
    fn test_logging_speaker_ok() {
        assert!(LoggingSpeaker.say("hello").is_ok());
    }
}
