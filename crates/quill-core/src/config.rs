use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// Top-level configuration for the Quill application.
///
/// Loaded from a JSON document at startup and immutable afterwards. Each
/// section corresponds to a bounded context. Every recognized key has a
/// default; unknown keys in the user document are ignored, and keys whose
/// user value is JSON `null` never override a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    pub transcription: TranscriptionConfig,
    pub output: OutputConfig,
    pub hotkeys: HotkeysConfig,
    pub completion: CompletionConfig,
    pub ui: UiConfig,
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self {
            transcription: TranscriptionConfig::default(),
            output: OutputConfig::default(),
            hotkeys: HotkeysConfig::default(),
            completion: CompletionConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl QuillConfig {
    /// Load configuration from a JSON file, merging user values onto the
    /// documented defaults.
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        Ok(Self::from_overlay(user))
    }

    /// Load configuration, falling back to pure defaults if the file is
    /// missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Merge a user-supplied JSON document onto the defaults.
    ///
    /// Recurses into nested objects. Keys absent from the defaults are
    /// ignored, `null` user values are skipped, and a user value whose JSON
    /// kind disagrees with the default (object vs. scalar) is skipped too.
    pub fn from_overlay(user: Value) -> Self {
        let mut base = match serde_json::to_value(Self::default()) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to serialize default config");
                return Self::default();
            }
        };
        merge_overlay(&mut base, &user);
        match serde_json::from_value(base) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Merged config failed to deserialize; using defaults");
                Self::default()
            }
        }
    }

    /// Save the current configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn merge_overlay(base: &mut Value, user: &Value) {
    if let (Value::Object(base_map), Value::Object(user_map)) = (base, user) {
        for (key, user_value) in user_map {
            if user_value.is_null() {
                continue;
            }
            if let Some(base_value) = base_map.get_mut(key) {
                match (base_value.is_object(), user_value.is_object()) {
                    (true, true) => merge_overlay(base_value, user_value),
                    (false, false) => *base_value = user_value.clone(),
                    _ => {}
                }
            }
        }
    }
}

/// How the recording phase of a session decides when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    VoiceActivityDetection,
    PressToToggle,
    HoldToRecord,
}

/// Speech-to-text engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Use the remote transcription API instead of a local model.
    pub use_api: bool,
    /// Options passed to the remote API engine.
    pub api: ApiOptions,
    /// Options passed to the local model engine.
    pub local: LocalModelOptions,
    pub recording_mode: RecordingMode,
    /// Capture device name; `None` selects the system default.
    pub sound_device: Option<String>,
    pub sample_rate: u32,
    /// Silence span that ends a voice-activity-detection recording.
    pub silence_duration_ms: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            use_api: false,
            api: ApiOptions::default(),
            local: LocalModelOptions::default(),
            recording_mode: RecordingMode::VoiceActivityDetection,
            sound_device: None,
            sample_rate: 16_000,
            silence_duration_ms: 900,
        }
    }
}

/// Remote transcription API options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOptions {
    pub model: String,
    pub language: Option<String>,
    pub temperature: f64,
    pub initial_prompt: Option<String>,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            model: "whisper".to_string(),
            language: None,
            temperature: 0.0,
            initial_prompt: None,
        }
    }
}

/// Local transcription model options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalModelOptions {
    pub model: String,
    pub device: String,
    pub compute_type: String,
    pub language: Option<String>,
    pub temperature: f64,
    pub initial_prompt: Option<String>,
    pub condition_on_previous_text: bool,
    pub vad_filter: bool,
}

impl Default for LocalModelOptions {
    fn default() -> Self {
        Self {
            model: "small".to_string(),
            device: "auto".to_string(),
            compute_type: "auto".to_string(),
            language: None,
            temperature: 0.0,
            initial_prompt: None,
            condition_on_previous_text: true,
            vad_filter: false,
        }
    }
}

/// Response emission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Pause between simulated key presses, in seconds.
    pub key_press_delay_secs: f64,
    /// Play the completion chime (blocks re-arming until finished).
    pub chime_on_completion: bool,
    pub remove_trailing_period: bool,
    pub add_trailing_space: bool,
    pub remove_capitalization: bool,
    pub print_to_terminal: bool,
    /// Speak responses instead of typing them in hands-free mode.
    pub speak_responses: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            key_press_delay_secs: 0.008,
            chime_on_completion: false,
            remove_trailing_period: true,
            add_trailing_space: false,
            remove_capitalization: false,
            print_to_terminal: true,
            speak_responses: false,
        }
    }
}

/// Built-in trigger combinations.
///
/// `activation` is user-configurable; the auxiliary combinations are a
/// fixed set registered at startup alongside any user-defined hotkeys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeysConfig {
    pub activation: String,
    pub secondary_activation: String,
    pub cancel: String,
    pub cancel_alt: String,
    pub clipboard_dispatch: String,
    pub hands_free: String,
}

impl Default for HotkeysConfig {
    fn default() -> Self {
        Self {
            activation: "ctrl+shift+space".to_string(),
            secondary_activation: "ctrl+alt+space".to_string(),
            cancel: "alt+c".to_string(),
            cancel_alt: "ctrl+alt+i".to_string(),
            clipboard_dispatch: "ctrl+alt+v".to_string(),
            hands_free: "ctrl+alt+f".to_string(),
        }
    }
}

/// Text-completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,
    /// Fixed response budget; not adjustable per call.
    pub max_tokens: u32,
    /// Number of retrieved chunks merged into the system context.
    pub retrieval_k: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "llama3-8b-8192".to_string(),
            max_tokens: 100,
            retrieval_k: 2,
        }
    }
}

/// Settings consumed by the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub hide_status_window: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            hide_status_window: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = QuillConfig::default();
        assert!(!config.transcription.use_api);
        assert_eq!(config.transcription.sample_rate, 16_000);
        assert_eq!(config.transcription.silence_duration_ms, 900);
        assert_eq!(
            config.transcription.recording_mode,
            RecordingMode::VoiceActivityDetection
        );
        assert_eq!(config.hotkeys.activation, "ctrl+shift+space");
        assert_eq!(config.completion.model, "llama3-8b-8192");
        assert_eq!(config.completion.max_tokens, 100);
        assert_eq!(config.completion.retrieval_k, 2);
        assert!((config.output.key_press_delay_secs - 0.008).abs() < f64::EPSILON);
        assert!(config.output.remove_trailing_period);
        assert!(!config.output.speak_responses);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
{
  "transcription": { "use_api": true, "sample_rate": 44100 },
  "hotkeys": { "activation": "ctrl+alt+q" },
  "completion": { "model": "mixtral-8x7b-32768" }
}
"#;
        let file = create_temp_config(content);
        let config = QuillConfig::load(file.path()).unwrap();
        assert!(config.transcription.use_api);
        assert_eq!(config.transcription.sample_rate, 44_100);
        assert_eq!(config.hotkeys.activation, "ctrl+alt+q");
        assert_eq!(config.completion.model, "mixtral-8x7b-32768");
        // Untouched sections keep their defaults
        assert_eq!(config.transcription.silence_duration_ms, 900);
        assert_eq!(config.hotkeys.hands_free, "ctrl+alt+f");
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = QuillConfig::from_overlay(json!({
            "output": { "speak_responses": true }
        }));
        assert!(config.output.speak_responses);
        assert!(config.output.remove_trailing_period);
        assert_eq!(config.completion.max_tokens, 100);
    }

    #[test]
    fn test_null_never_overrides_default() {
        let config = QuillConfig::from_overlay(json!({
            "transcription": { "sample_rate": null, "use_api": null },
            "completion": { "model": null },
            "output": null
        }));
        assert_eq!(config.transcription.sample_rate, 16_000);
        assert!(!config.transcription.use_api);
        assert_eq!(config.completion.model, "llama3-8b-8192");
        assert!(config.output.print_to_terminal);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = QuillConfig::from_overlay(json!({
            "transcription": { "sample_rate": 8000, "bit_depth": 24 },
            "telemetry": { "enabled": true }
        }));
        assert_eq!(config.transcription.sample_rate, 8_000);
    }

    #[test]
    fn test_type_mismatch_skipped() {
        // A scalar where an object is expected (and vice versa) is ignored.
        let config = QuillConfig::from_overlay(json!({
            "transcription": "fast",
            "output": { "key_press_delay_secs": { "value": 1 } }
        }));
        assert_eq!(config.transcription.sample_rate, 16_000);
        assert!((config.output.key_press_delay_secs - 0.008).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nested_engine_options_merge() {
        let config = QuillConfig::from_overlay(json!({
            "transcription": {
                "local": { "model": "medium", "language": "en" },
                "api": { "temperature": 0.3 }
            }
        }));
        assert_eq!(config.transcription.local.model, "medium");
        assert_eq!(config.transcription.local.language.as_deref(), Some("en"));
        assert!(config.transcription.local.condition_on_previous_text);
        assert!((config.transcription.api.temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.transcription.api.model, "whisper");
    }

    #[test]
    fn test_recording_mode_values() {
        for (raw, expected) in [
            ("voice_activity_detection", RecordingMode::VoiceActivityDetection),
            ("press_to_toggle", RecordingMode::PressToToggle),
            ("hold_to_record", RecordingMode::HoldToRecord),
        ] {
            let config = QuillConfig::from_overlay(json!({
                "transcription": { "recording_mode": raw }
            }));
            assert_eq!(config.transcription.recording_mode, expected);
        }
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = QuillConfig::load_or_default(Path::new("/nonexistent/config.json"));
        assert_eq!(config.hotkeys.activation, "ctrl+shift+space");
    }

    #[test]
    fn test_load_or_default_malformed_json() {
        let file = create_temp_config("this is {{ not valid JSON");
        let config = QuillConfig::load_or_default(file.path());
        assert_eq!(config.completion.max_tokens, 100);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");

        let mut config = QuillConfig::default();
        config.hotkeys.activation = "f9".to_string();
        config.save(&path).unwrap();

        let reloaded = QuillConfig::load(&path).unwrap();
        assert_eq!(reloaded.hotkeys.activation, "f9");
        assert_eq!(reloaded.completion.max_tokens, config.completion.max_tokens);
    }

    #[test]
    fn test_empty_document_uses_all_defaults() {
        let file = create_temp_config("{}");
        let config = QuillConfig::load(file.path()).unwrap();
        assert_eq!(config.transcription.local.model, "small");
        assert_eq!(config.hotkeys.clipboard_dispatch, "ctrl+alt+v");
    }
}
