//! Development tasks for clippy-agent
//!
//! Usage:
//!   cargo xtask install    Install release binary to /usr/local/bin (requires sudo)
//!   cargo xtask uninstall  Remove binary from /usr/local/bin (requires sudo)
//!   cargo xtask dist       Build release binary for distribution
//!   cargo xtask man        Generate man pages (path printed by build.rs)

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const BINARY: &str = "clippy-agent";
const INSTALL_PATH: &str = "/usr/local/bin/clippy-agent";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(command) = args.first() else {
        print_help();
        return ExitCode::SUCCESS;
    };

    let result = match command.as_str() {
        "install" => install(),
        "uninstall" => uninstall(),
        "dist" => dist(),
        "man" => man(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    eprintln!(
        r#"
clippy-agent development tasks

Usage: cargo xtask <COMMAND>

Commands:
  install    Build release binary and install to /usr/local/bin (requires sudo)
  uninstall  Remove clippy-agent from /usr/local/bin (requires sudo)
  dist       Build optimized release binary for distribution
  man        Generate man pages (build.rs prints the output path)

Examples:
  cargo xtask install      # Build and install
  cargo xtask man          # Regenerate man pages
  cargo xtask uninstall    # Remove installed binary
"#
    );
}

/// Get the project root directory
fn project_root() -> anyhow::Result<PathBuf> {
    let dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => env::current_dir()?,
    };

    // xtask is in a subdirectory, go up one level
    Ok(dir.parent().unwrap_or(&dir).to_path_buf())
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("Non UTF-8 path: {:?}", path))
}

fn cargo_release(root: &Path, envs: &[(&str, &str)]) -> anyhow::Result<()> {
    let status = Command::new("cargo")
        .args(["build", "--release"])
        .envs(envs.iter().copied())
        .current_dir(root)
        .status()?;

    if !status.success() {
        anyhow::bail!("Build failed");
    }
    Ok(())
}

/// Build release binary and install to /usr/local/bin
fn install() -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Building release binary...");
    cargo_release(&root, &[])?;

    let binary = root.join("target/release").join(BINARY);
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }

    println!("==> Installing to {}...", INSTALL_PATH);

    let status = Command::new("sudo")
        .args(["install", "-Dm755", path_str(&binary)?, INSTALL_PATH])
        .status()?;

    if !status.success() {
        anyhow::bail!("Install failed (sudo required)");
    }

    println!("==> Installed successfully!");
    println!();
    println!("Installed: {}", INSTALL_PATH);
    if cfg!(target_os = "macos") {
        println!("Grant Input Monitoring and Accessibility with:");
        println!("    {} permissions --request", BINARY);
    }

    let _ = Command::new(INSTALL_PATH).arg("--version").status();

    Ok(())
}

/// Remove clippy-agent from /usr/local/bin
fn uninstall() -> anyhow::Result<()> {
    println!("==> Removing {}...", INSTALL_PATH);

    let status = Command::new("sudo")
        .args(["rm", "-f", INSTALL_PATH])
        .status()?;

    if !status.success() {
        anyhow::bail!("Uninstall failed (sudo required)");
    }

    println!("==> Uninstalled successfully!");
    Ok(())
}

/// Build optimized release binary for distribution
fn dist() -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Building distribution binary...");
    cargo_release(&root, &[])?;

    let binary = root.join("target/release").join(BINARY);
    println!("==> Built: {:?}", binary);

    let _ = Command::new("ls").args(["-lh", path_str(&binary)?]).status();
    let _ = Command::new(&binary).arg("--version").status();

    Ok(())
}

/// Regenerate man pages through build.rs
fn man() -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Generating man pages...");
    cargo_release(&root, &[("CLIPPY_GEN_MANPAGES", "1")])?;

    println!("==> Man pages written under target/release/build/clippy-agent-*/out/man");
    Ok(())
}
