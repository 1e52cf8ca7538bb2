//! Platform-specific desktop notifications
//!
//! - Linux: notify-send (libnotify)
//! - macOS: terminal-notifier when installed, osascript otherwise
//!
//! Notifications are best effort. Failures are logged at debug level and
//! never reach the caller.

use crate::config::NotificationConfig;
use std::process::Stdio;
use tokio::process::Command;

/// Kinds of events the agent may notify about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    /// Permission problems, failed answers
    Error,
    /// A clipboard item could not be saved
    SaveFailure,
    /// An answer was injected
    Answer,
}

/// Whether `kind` is enabled in `config`
pub fn enabled(config: &NotificationConfig, kind: NotifyKind) -> bool {
    match kind {
        NotifyKind::Error => config.on_error,
        NotifyKind::SaveFailure => config.on_save_failure,
        NotifyKind::Answer => config.on_answer,
    }
}

/// Send a notification if `kind` is enabled
pub async fn notify(config: &NotificationConfig, kind: NotifyKind, title: &str, body: &str) {
    if enabled(config, kind) {
        send(title, body).await;
    } else {
        tracing::trace!("Notification suppressed ({:?}): {}", kind, body);
    }
}

/// Send a desktop notification with the given title and body.
pub async fn send(title: &str, body: &str) {
    let body = truncate(body, 120);

    #[cfg(target_os = "linux")]
    send_linux(title, &body).await;

    #[cfg(target_os = "macos")]
    send_macos(title, &body).await;

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        tracing::debug!("Notifications not supported on this platform");
        let _ = (title, body);
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Escape a string for use inside an AppleScript string literal
pub fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(target_os = "linux")]
async fn send_linux(title: &str, body: &str) {
    let result = Command::new("notify-send")
        .args(["--app-name=Clippy", "--expire-time=3000", title, body])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

#[cfg(target_os = "macos")]
async fn send_macos(title: &str, body: &str) {
    let via_notifier = Command::new("terminal-notifier")
        .args(["-title", title, "-message", body, "-group", "clippy-agent"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);
    if via_notifier {
        return;
    }

    let script = format!(
        r#"display notification "{}" with title "{}""#,
        escape_applescript(body),
        escape_applescript(title)
    );

    let result = Command::new("osascript")
        .args(["-e", &script])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}
