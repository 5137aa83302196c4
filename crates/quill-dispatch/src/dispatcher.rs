//! Top-level hotkey-triggered orchestration.
//!
//! Per-combination state machine: Armed -> Firing -> Armed. A cycle
//! delegates to the session manager, assembles the query, calls the
//! completion service, emits the response, and then re-arms the combination
//! unconditionally - success, failure, or cancellation alike.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quill_core::config::QuillConfig;
use quill_core::error::Result;

use quill_context::assembler::{Assembled, ContextAssembler};
use quill_context::clipboard::ClipboardAccess;
use quill_context::completion::{CompletionRequest, CompletionService};
use quill_hotkey::registry::{ActionType, HotkeyRegistry};
use quill_session::manager::{SessionHandle, SessionManager};
use quill_session::token::CancellationToken;

use crate::app_context::AppContext;
use crate::output::{typewrite, Chime, Keystrokes, Speaker};

/// What a press event asks the dispatcher to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Activation,
    SecondaryActivation,
    Cancel,
    ClipboardDispatch,
    HandsFree,
    /// A user-defined hotkey, by registry name.
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArmState {
    Armed,
    Firing,
}

/// Output sinks the dispatcher emits through.
pub struct OutputSinks {
    pub keys: Arc<dyn Keystrokes>,
    pub speaker: Arc<dyn Speaker>,
    pub chime: Arc<dyn Chime>,
}

/// Top-level orchestrator tying hotkeys to sessions, assembly, completion,
/// and emission.
pub struct Dispatcher {
    config: QuillConfig,
    sessions: Arc<SessionManager>,
    registry: Arc<HotkeyRegistry>,
    assembler: Arc<ContextAssembler>,
    app: Arc<AppContext>,
    completion: Arc<dyn CompletionService>,
    clipboard: Arc<dyn ClipboardAccess>,
    sinks: OutputSinks,
    arm: Mutex<HashMap<String, ArmState>>,
    /// Session left recording by the previous hands-free cycle.
    hands_free_pending: Mutex<Option<SessionHandle>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: QuillConfig,
        sessions: Arc<SessionManager>,
        registry: Arc<HotkeyRegistry>,
        assembler: Arc<ContextAssembler>,
        app: Arc<AppContext>,
        completion: Arc<dyn CompletionService>,
        clipboard: Arc<dyn ClipboardAccess>,
        sinks: OutputSinks,
    ) -> Self {
        Self {
            config,
            sessions,
            registry,
            assembler,
            app,
            completion,
            clipboard,
            sinks,
            arm: Mutex::new(HashMap::new()),
            hands_free_pending: Mutex::new(None),
        }
    }

    /// Handle one trigger to completion. The caller (the hotkey event loop)
    /// awaits this before polling again, so a given combination never runs
    /// two cycles concurrently.
    pub async fn fire(&self, trigger: Trigger) {
        match trigger {
            Trigger::Cancel => self.sessions.cancel_active(),
            Trigger::Activation => {
                let combo = self.config.hotkeys.activation.clone();
                self.run_activation(&combo, false).await;
            }
            Trigger::SecondaryActivation => {
                let combo = self.config.hotkeys.secondary_activation.clone();
                self.run_activation(&combo, false).await;
            }
            Trigger::HandsFree => {
                let combo = self.config.hotkeys.hands_free.clone();
                self.run_activation(&combo, true).await;
            }
            Trigger::ClipboardDispatch => self.run_clipboard_dispatch().await,
            Trigger::Custom(name) => self.run_custom(&name).await,
        }
    }

    /// Map a pressed combination to its trigger.
    pub fn trigger_for(&self, combination: &str) -> Option<Trigger> {
        let hotkeys = &self.config.hotkeys;
        if combination == hotkeys.activation {
            Some(Trigger::Activation)
        } else if combination == hotkeys.secondary_activation {
            Some(Trigger::SecondaryActivation)
        } else if combination == hotkeys.cancel || combination == hotkeys.cancel_alt {
            Some(Trigger::Cancel)
        } else if combination == hotkeys.clipboard_dispatch {
            Some(Trigger::ClipboardDispatch)
        } else if combination == hotkeys.hands_free {
            Some(Trigger::HandsFree)
        } else {
            self.registry
                .binding_for_combination(combination)
                .map(|(name, _)| Trigger::Custom(name))
        }
    }

    // -------------------------------------------------------------------------
    // Cycles
    // -------------------------------------------------------------------------

    async fn run_activation(&self, combination: &str, hands_free: bool) {
        if !self.begin_firing(combination) {
            return;
        }

        self.activation_cycle(hands_free).await;

        if self.config.output.chime_on_completion {
            self.sinks.chime.play_blocking();
        }
        self.rearm(combination);
    }

    async fn activation_cycle(&self, hands_free: bool) {
        let handle = if hands_free {
            self.take_pending_or_start()
        } else {
            self.sessions.start_session()
        };
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start session");
                return;
            }
        };

        let token = handle.token();
        let text = self.join_session(handle).await;

        let Some(text) = text else {
            tracing::info!("Session produced no text; nothing to dispatch");
            self.restart_hands_free(hands_free);
            return;
        };

        if let Some(response) = self.respond(&text).await {
            self.emit(&response, &token, hands_free).await;
        }
        self.restart_hands_free(hands_free);
    }

    async fn run_clipboard_dispatch(&self) {
        let combination = self.config.hotkeys.clipboard_dispatch.clone();
        if !self.begin_firing(&combination) {
            return;
        }

        let query = self.read_clipboard();
        if query.is_empty() {
            tracing::info!("Clipboard empty; nothing to dispatch");
        } else if let Some(response) = self.respond(&query).await {
            let token = CancellationToken::new();
            self.emit(&response, &token, false).await;
        }

        self.rearm(&combination);
    }

    async fn run_custom(&self, name: &str) {
        let Some(binding) = self.registry.get(name) else {
            tracing::warn!(name = %name, "Unknown hotkey fired");
            return;
        };
        if !self.begin_firing(&binding.combination) {
            return;
        }

        let clipboard_content = self.read_clipboard();
        let query = match &binding.post_processing {
            Some(command) => format!("{} {}", command, clipboard_content),
            None => clipboard_content,
        };

        if let Some(response) = self.respond(&query).await {
            match binding.action {
                ActionType::Json => match self.app.store().set(name, response) {
                    Ok(()) => tracing::info!(name = %name, "Response saved to store"),
                    Err(e) => tracing::warn!(name = %name, error = %e, "Failed to save response"),
                },
                ActionType::Print => {
                    let token = CancellationToken::new();
                    self.emit(&response, &token, false).await;
                }
            }
        }

        self.rearm(&binding.combination);
    }

    // -------------------------------------------------------------------------
    // Steps
    // -------------------------------------------------------------------------

    fn take_pending_or_start(&self) -> Result<SessionHandle> {
        let pending = self
            .hands_free_pending
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        match pending {
            Some(handle) => Ok(handle),
            None => self.sessions.start_session(),
        }
    }

    /// Leave a fresh session recording so the next hands-free press picks it
    /// up already running.
    fn restart_hands_free(&self, hands_free: bool) {
        if !hands_free {
            return;
        }
        match self.sessions.start_session() {
            Ok(handle) => {
                if let Ok(mut slot) = self.hands_free_pending.lock() {
                    *slot = Some(handle);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to restart hands-free session"),
        }
    }

    async fn join_session(&self, handle: SessionHandle) -> Option<String> {
        let sessions = Arc::clone(&self.sessions);
        match tokio::task::spawn_blocking(move || sessions.join(handle)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Session join task failed");
                None
            }
        }
    }

    /// Assemble the query and, unless the update command short-circuited,
    /// call the completion service. `None` means nothing to emit.
    async fn respond(&self, text: &str) -> Option<String> {
        let k = self.config.completion.retrieval_k;
        match self.assembler.assemble(text, k).await {
            Ok(Assembled::Updated { confirmation, .. }) => Some(confirmation),
            Ok(Assembled::Query {
                final_query,
                system_context,
            }) => {
                let request = CompletionRequest {
                    system_context,
                    store_json: self.assembler.store().serialized(),
                    query: final_query,
                    model: self.app.model(),
                    max_tokens: self.config.completion.max_tokens,
                };
                match self.completion.complete(request).await {
                    Ok(response) => Some(response),
                    Err(e) => {
                        tracing::warn!(error = %e, "Completion call failed");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Context assembly failed");
                None
            }
        }
    }

    async fn emit(&self, response: &str, token: &CancellationToken, hands_free: bool) {
        if hands_free && self.config.output.speak_responses {
            if let Err(e) = self.sinks.speaker.say(response) {
                tracing::warn!(error = %e, "Speech output failed");
            }
            return;
        }

        let interval = Duration::from_secs_f64(self.config.output.key_press_delay_secs);
        match typewrite(response, interval, token, self.sinks.keys.as_ref()).await {
            Ok(emitted) => tracing::debug!(emitted, "Response emitted"),
            Err(e) => tracing::warn!(error = %e, "Emission failed"),
        }
    }

    // -------------------------------------------------------------------------
    // Arming
    // -------------------------------------------------------------------------

    fn begin_firing(&self, combination: &str) -> bool {
        let Ok(mut arm) = self.arm.lock() else {
            return false;
        };
        let state = arm
            .entry(combination.to_string())
            .or_insert(ArmState::Armed);
        if *state == ArmState::Firing {
            tracing::debug!(combination = %combination, "Trigger ignored while firing");
            return false;
        }
        *state = ArmState::Firing;
        true
    }

    /// Remove and re-add the OS binding, then return to Armed. Runs in every
    /// outcome so the combination cannot be left dead.
    fn rearm(&self, combination: &str) {
        if let Err(e) = self.registry.rearm(combination) {
            tracing::warn!(combination = %combination, error = %e, "Re-arm failed");
        }
        if let Ok(mut arm) = self.arm.lock() {
            arm.insert(combination.to_string(), ArmState::Armed);
        }
    }

    fn read_clipboard(&self) -> String {
        match self.clipboard.read() {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "Clipboard read failed; treating as empty");
                String::new()
            }
        }
    }
}
