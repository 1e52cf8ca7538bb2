//! Frontmost application lookup and re-activation
//!
//! The clipboard monitor records which app an item came from, the ranking
//! engine favours items from the app in front, and the replacement engine
//! brings the captured app back to the front before typing.
//!
//! - macOS: osascript talking to System Events
//! - Linux (X11): xdotool

#[cfg(target_os = "macos")]
use crate::notification::escape_applescript;
use std::process::Stdio;
use tokio::process::Command;

/// Frontmost-app capability
#[async_trait::async_trait]
pub trait FocusProvider: Send + Sync {
    /// Name of the application in front, if it can be determined
    async fn frontmost_app(&self) -> Option<String>;

    /// Bring `app` to the front. Returns false on failure.
    async fn activate(&self, app: &str) -> bool;
}

/// Focus provider backed by platform command-line tools
pub struct SystemFocus;

async fn run_capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| tracing::debug!("{} unavailable: {}", program, e))
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

async fn run_status(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[async_trait::async_trait]
impl FocusProvider for SystemFocus {
    #[cfg(target_os = "macos")]
    async fn frontmost_app(&self) -> Option<String> {
        run_capture(
            "osascript",
            &[
                "-e",
                "tell application \"System Events\" to get name of first application process whose frontmost is true",
            ],
        )
        .await
    }

    #[cfg(not(target_os = "macos"))]
    async fn frontmost_app(&self) -> Option<String> {
        match run_capture("xdotool", &["getactivewindow", "getwindowclassname"]).await {
            Some(class) => Some(class),
            None => run_capture("xdotool", &["getactivewindow", "getwindowname"]).await,
        }
    }

    #[cfg(target_os = "macos")]
    async fn activate(&self, app: &str) -> bool {
        let script = format!("tell application \"{}\" to activate", escape_applescript(app));
        run_status("osascript", &["-e", &script]).await
    }

    #[cfg(not(target_os = "macos"))]
    async fn activate(&self, app: &str) -> bool {
        run_status("xdotool", &["search", "--limit", "1", "--class", app, "windowactivate"]).await
    }
}
