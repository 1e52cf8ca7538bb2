//! Configuration loading and types for clippy-agent
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/clippy-agent/config.toml)
//! 3. Environment variables (CLIPPY_*)
//! 4. CLI arguments (highest priority)

use crate::error::ClippyError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# clippy-agent Configuration
#
# Location: ~/.config/clippy-agent/config.toml
# All settings can be overridden via CLI flags

# State file for external integrations (status bars, scripts).
# Use "auto" for the default location ($XDG_RUNTIME_DIR/clippy-agent/state),
# a custom path, or "disabled" to turn off. The daemon writes its phase
# ("idle", "capturing", "thinking", "done", "error") whenever it changes.
state_file = "auto"

[hotkey]
# Enable the global keyboard tap (default: true)
enabled = true

# Chord that starts capturing a question; press again to ask it.
# Modifiers: cmd, ctrl, alt (option), shift. Key: a single letter.
capture = "ctrl+alt+k"

# Chord that ranks history for the focused app and publishes suggestions
# suggest = "ctrl+alt+j"

# Seconds between attempts to start the tap after permission was missing
# retry_interval_secs = 5

[capture]
# Swallow keystrokes while capturing so the focused app never sees them
consume_keys = true

# How long "done" / "error" stay visible before returning to idle (ms)
# reset_delay_ms = 1500

[clipboard]
enabled = true

# Poll interval in milliseconds
poll_interval_ms = 500

# Minimum number of non-whitespace characters for a text item
min_length = 3

# Store copied images (PNG side files, described by the AI sidecar)
images = true

# Exact clipboard strings that are never stored
# ignored_signatures = ["Clipboard monitoring started"]

[replacement]
# Delay between backspace key-down and key-up (ms)
key_pair_delay_ms = 2
# Delay between deleted characters (ms)
char_delay_ms = 1
# Wait between deletion and insertion (ms)
settle_delay_ms = 200
# Character-by-character fallback timings (ms)
insert_key_delay_ms = 2
insert_char_delay_ms = 8

[ranking]
# Number of suggestions returned
top_k = 3
# Recent items considered as candidates
candidate_limit = 200
# Results requested from the vector index
search_limit = 20

[ai]
# Sidecar service providing tags, answers, descriptions and embeddings
endpoint = "http://127.0.0.1:8000"
timeout_secs = 30
# Set to false to rank with lexical scoring only
vector_search = true
# api_key = "..."   # or CLIPPY_API_KEY

[storage]
# "auto" uses ~/.local/share/clippy-agent/
path = "auto"

[notification]
on_error = true
on_save_failure = true
on_answer = false
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub clipboard: ClipboardConfig,

    #[serde(default)]
    pub replacement: ReplacementConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    /// Optional path to state file for external integrations
    /// "auto" resolves to $XDG_RUNTIME_DIR/clippy-agent/state
    #[serde(default)]
    pub state_file: Option<String>,
}

/// Global hotkey configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Enable the global keyboard tap
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chord toggling text capture, e.g. "ctrl+alt+k"
    #[serde(default = "default_capture_chord")]
    pub capture: String,

    /// Chord publishing suggestions for the focused app
    #[serde(default)]
    pub suggest: Option<String>,

    /// Seconds between tap start attempts while permission is missing
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

/// Capture session behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Swallow keys while capturing
    #[serde(default = "default_true")]
    pub consume_keys: bool,

    /// Delay before "done"/"error" fall back to "idle"
    #[serde(default = "default_reset_delay")]
    pub reset_delay_ms: u64,
}

/// Clipboard monitor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClipboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Minimum non-whitespace characters for text items
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_true")]
    pub images: bool,

    /// Exact strings that are never stored (debug output copied by accident)
    #[serde(default = "default_ignored_signatures")]
    pub ignored_signatures: Vec<String>,
}

/// Replacement timings, all in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplacementConfig {
    #[serde(default = "default_key_pair_delay")]
    pub key_pair_delay_ms: u64,

    #[serde(default = "default_char_delay")]
    pub char_delay_ms: u64,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_insert_key_delay")]
    pub insert_key_delay_ms: u64,

    #[serde(default = "default_insert_char_delay")]
    pub insert_char_delay_ms: u64,
}

/// Ranking configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RankingConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

/// AI sidecar configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Optional bearer token (falls back to CLIPPY_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Use the sidecar's vector index for ranking
    #[serde(default = "default_true")]
    pub vector_search: bool,
}

/// Item store location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// "auto" or a directory
    #[serde(default = "default_storage_path")]
    pub path: String,
}

/// Desktop notification switches
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Permission problems and failed answers
    #[serde(default = "default_true")]
    pub on_error: bool,

    /// Clipboard items that could not be persisted
    #[serde(default = "default_true")]
    pub on_save_failure: bool,

    /// Show the injected answer
    #[serde(default)]
    pub on_answer: bool,
}

fn default_true() -> bool {
    true
}

fn default_capture_chord() -> String {
    "ctrl+alt+k".to_string()
}

fn default_retry_interval() -> u64 {
    5
}

fn default_reset_delay() -> u64 {
    1500
}

fn default_poll_interval() -> u64 {
    500
}

fn default_min_length() -> usize {
    3
}

fn default_ignored_signatures() -> Vec<String> {
    vec![
        "Clipboard monitoring started".to_string(),
        "Clipboard monitoring stopped".to_string(),
        "Input monitoring permission granted".to_string(),
        "Accessibility permission granted".to_string(),
    ]
}

fn default_key_pair_delay() -> u64 {
    2
}

fn default_char_delay() -> u64 {
    1
}

fn default_settle_delay() -> u64 {
    200
}

fn default_insert_key_delay() -> u64 {
    2
}

fn default_insert_char_delay() -> u64 {
    8
}

fn default_top_k() -> usize {
    3
}

fn default_candidate_limit() -> usize {
    200
}

fn default_search_limit() -> usize {
    20
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_storage_path() -> String {
    "auto".to_string()
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture: default_capture_chord(),
            suggest: None,
            retry_interval_secs: default_retry_interval(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            consume_keys: true,
            reset_delay_ms: default_reset_delay(),
        }
    }
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval(),
            min_length: default_min_length(),
            images: true,
            ignored_signatures: default_ignored_signatures(),
        }
    }
}

impl Default for ReplacementConfig {
    fn default() -> Self {
        Self {
            key_pair_delay_ms: default_key_pair_delay(),
            char_delay_ms: default_char_delay(),
            settle_delay_ms: default_settle_delay(),
            insert_key_delay_ms: default_insert_key_delay(),
            insert_char_delay_ms: default_insert_char_delay(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_limit: default_candidate_limit(),
            search_limit: default_search_limit(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            timeout_secs: default_timeout(),
            vector_search: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_error: true,
            on_save_failure: true,
            on_answer: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            capture: CaptureConfig::default(),
            clipboard: ClipboardConfig::default(),
            replacement: ReplacementConfig::default(),
            ranking: RankingConfig::default(),
            ai: AiConfig::default(),
            storage: StorageConfig::default(),
            notification: NotificationConfig::default(),
            state_file: Some("auto".to_string()),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "clippy-agent")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (state, pid, lock)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("clippy-agent")
    }

    /// Resolve the state file path from config
    /// Returns None if state_file is not configured or explicitly disabled
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "clippy-agent")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Resolve the data directory (database and image side files)
    pub fn data_dir(&self) -> PathBuf {
        match self.storage.path.as_str() {
            "auto" | "" => directories::ProjectDirs::from("", "", "clippy-agent")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            other => PathBuf::from(other),
        }
    }

    /// Path of the SQLite history database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("history.db")
    }

    /// Directory holding PNG side files for image items
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir().join("images")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }

        let images_dir = self.images_dir();
        std::fs::create_dir_all(&images_dir)?;
        tracing::debug!("Ensured images directory exists: {:?}", images_dir);

        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, ClippyError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ClippyError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| ClippyError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Apply CLIPPY_* environment overrides through a lookup function
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(chord) = lookup("CLIPPY_HOTKEY") {
        config.hotkey.capture = chord;
    }
    if let Some(endpoint) = lookup("CLIPPY_ENDPOINT") {
        config.ai.endpoint = endpoint;
    }
    if let Some(key) = lookup("CLIPPY_API_KEY") {
        config.ai.api_key = Some(key);
    }
    if let Some(interval) = lookup("CLIPPY_POLL_INTERVAL_MS") {
        match interval.parse() {
            Ok(ms) => config.clipboard.poll_interval_ms = ms,
            Err(_) => tracing::warn!("Ignoring invalid CLIPPY_POLL_INTERVAL_MS: {:?}", interval),
        }
    }
}
