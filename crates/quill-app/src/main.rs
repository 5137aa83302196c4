//! Quill application binary - composition root.
//!
//! Ties the Quill crates together into a single executable:
//! 1. Load configuration from JSON
//! 2. Truncate the key/value data store for this run
//! 3. Open the hotkey registry (seeded from the persisted definitions)
//!    and bind the built-in trigger combinations
//! 4. Wire the session manager, context assembler, and dispatcher
//! 5. Poll the OS hotkey receiver and route presses into the dispatcher
//!
//! The speech-to-text engine and the completion service are external
//! collaborators; this binary wires placeholder implementations that log
//! and degrade to "no result" until real engines are plugged in.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use quill_core::config::{QuillConfig, TranscriptionConfig};
use quill_core::error::{QuillError, Result};

use quill_context::assembler::ContextAssembler;
use quill_context::clipboard::ClipboardAccess;
use quill_context::completion::{CompletionRequest, CompletionService};
use quill_context::retrieval::{HashedEmbedding, MemoryRetriever, Retriever};
use quill_context::store::KeyValueStore;
use quill_dispatch::dispatcher::OutputSinks;
use quill_dispatch::output::{EnigoKeystrokes, LoggingSpeaker, SilentChime, SystemClipboard};
use quill_dispatch::{AppContext, Dispatcher};
use quill_hotkey::binder::{GlobalHotkeyBinder, HotkeyBinder};
use quill_hotkey::registry::HotkeyRegistry;
use quill_session::manager::{SessionManager, Transcriber};
use quill_session::status::StatusChannel;
use quill_session::token::CancellationToken;

/// Placeholder transcriber: no audio engine is wired in, so every session
/// completes with no result.
struct UnconfiguredTranscriber;

impl Transcriber for UnconfiguredTranscriber {
    fn transcribe(
        &self,
        _config: &TranscriptionConfig,
        _status: &StatusChannel,
        _cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        tracing::warn!("No transcription engine configured; session yields no text");
        Ok(None)
    }
}

/// Placeholder completion service: fails the call, which the dispatcher
/// degrades to a null result.
struct UnconfiguredCompletion;

#[async_trait]
impl CompletionService for UnconfiguredCompletion {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        Err(QuillError::Completion(
            "No completion service configured".to_string(),
        ))
    }
}

/// Resolve the data directory (QUILL_HOME env, or ~/.quill).
fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("QUILL_HOME") {
        return PathBuf::from(dir);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".quill");
    }
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".quill");
    }
    PathBuf::from(".quill")
}

/// Resolve the config file path (QUILL_CONFIG env, or <data_dir>/config.json).
fn config_path(data_dir: &std::path::Path) -> PathBuf {
    if let Ok(p) = std::env::var("QUILL_CONFIG") {
        return PathBuf::from(p);
    }
    data_dir.join("config.json")
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Quill v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let config_file = config_path(&data_dir);
    let config = QuillConfig::load_or_default(&config_file);
    tracing::info!(path = %config_file.display(), "Configuration loaded");
    tracing::info!(
        engine = if config.transcription.use_api { "remote API" } else { "local model" },
        mode = ?config.transcription.recording_mode,
        "Transcription settings"
    );
    tracing::info!(combination = %config.hotkeys.activation, "Activation hotkey");

    // Key/value store, truncated so each run starts with known-clean data.
    let store = Arc::new(KeyValueStore::open(data_dir.join("data.json")));
    store.clear()?;

    // Hotkey registry, seeded from the persisted definitions.
    let binder: Arc<dyn HotkeyBinder> = Arc::new(GlobalHotkeyBinder::new()?);
    let registry = Arc::new(HotkeyRegistry::open(
        data_dir.join("hotkeys.json"),
        Arc::clone(&binder),
    ));

    // Built-in trigger combinations.
    for combination in [
        config.hotkeys.activation.as_str(),
        config.hotkeys.secondary_activation.as_str(),
        config.hotkeys.cancel.as_str(),
        config.hotkeys.cancel_alt.as_str(),
        config.hotkeys.clipboard_dispatch.as_str(),
        config.hotkeys.hands_free.as_str(),
    ] {
        if let Err(e) = registry.bind_combination(combination) {
            tracing::warn!(combination = %combination, error = %e, "Failed to bind trigger");
        }
    }

    // Session manager over the (placeholder) transcription engine.
    let status = StatusChannel::new();
    let sessions = Arc::new(SessionManager::new(
        config.transcription.clone(),
        config.output.clone(),
        Arc::new(UnconfiguredTranscriber),
        status,
    ));

    // Retrieval, store, and context assembly.
    let retriever: Arc<dyn Retriever> = Arc::new(MemoryRetriever::new(HashedEmbedding::new()));
    let clipboard: Arc<dyn ClipboardAccess> = Arc::new(SystemClipboard::new());
    let assembler = Arc::new(ContextAssembler::new(
        Arc::clone(&store),
        Arc::clone(&retriever),
        Arc::clone(&clipboard),
    ));
    let app = Arc::new(AppContext::new(
        config.completion.model.clone(),
        Arc::clone(&retriever),
        Arc::clone(&store),
    ));

    // Output sinks.
    let sinks = OutputSinks {
        keys: Arc::new(EnigoKeystrokes::new()?),
        speaker: Arc::new(LoggingSpeaker),
        chime: Arc::new(SilentChime),
    };

    let dispatcher = Arc::new(Dispatcher::new(
        config,
        sessions,
        Arc::clone(&registry),
        assembler,
        app,
        Arc::new(UnconfiguredCompletion),
        clipboard,
        sinks,
    ));

    // Hotkey event loop. Each press runs its handler to completion before
    // the next poll, so a combination never fires re-entrantly.
    let runtime = tokio::runtime::Handle::current();
    let loop_registry = Arc::clone(&registry);
    let loop_dispatcher = Arc::clone(&dispatcher);
    tokio::task::spawn_blocking(move || loop {
        if let Some(id) = binder.try_recv() {
            let trigger = loop_registry
                .combination_for(id)
                .and_then(|combo| loop_dispatcher.trigger_for(&combo));
            match trigger {
                Some(trigger) => {
                    tracing::debug!(?trigger, "Hotkey pressed");
                    runtime.block_on(loop_dispatcher.fire(trigger));
                }
                None => tracing::debug!(id = id.0, "Press for unknown binding ignored"),
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    });

    tracing::info!("Listening for hotkeys. Press Ctrl+C to quit.");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
