//! Error types for clippy-agent
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the clippy-agent application
#[derive(Error, Debug)]
pub enum ClippyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event tap error: {0}")]
    Tap(#[from] TapError),

    #[error("Text injection error: {0}")]
    Inject(#[from] InjectError),

    #[error("Clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("AI collaborator error: {0}")]
    Ai(#[from] AiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the global keyboard tap
#[derive(Error, Debug)]
pub enum TapError {
    #[error("Input monitoring permission required.\n  Grant access in: System Settings > Privacy & Security > Input Monitoring\n  Hotkeys stay disabled until access is granted.")]
    PermissionDenied,

    #[error("Invalid hotkey chord '{0}'. Use a form like \"ctrl+alt+k\" (modifiers: cmd, ctrl, alt, shift).")]
    InvalidChord(String),

    #[error("Event tap backend failed: {0}")]
    Backend(String),
}

/// Errors related to synthetic text replacement
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("Accessibility permission required.\n  Grant access in: System Settings > Privacy & Security > Accessibility")]
    PermissionDenied,

    #[error("A replacement is already in progress")]
    Busy,

    #[error("Replacement aborted after {deleted} deletions and {inserted} insertions")]
    Aborted { deleted: usize, inserted: usize },

    #[error("Failed to initialise input synthesis: {0}")]
    InitFailed(String),

    #[error("Synthetic event failed: {0}")]
    SynthesisFailed(String),
}

/// Errors related to reading or writing the system clipboard
#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("Clipboard image could not be encoded: {0}")]
    ImageEncoding(String),

    #[error("Failed to save clipboard item: {0}")]
    Persist(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the item store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Refusing to store an empty item")]
    EmptyContent,

    #[error("Item store lock poisoned")]
    Poisoned,
}

/// Errors returned by the AI collaborator and vector index
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Sidecar returned an error: {0}")]
    Server(String),

    #[error("Malformed sidecar response: {0}")]
    Malformed(String),

    #[error("Vector search is disabled")]
    Disabled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using ClippyError
pub type Result<T> = std::result::Result<T, ClippyError>;
