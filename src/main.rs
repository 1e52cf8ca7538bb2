//! clippy-agent - clipboard memory that answers where you type
//!
//! Run with `clippy-agent` or `clippy-agent daemon` to start the daemon.
//! Use `clippy-agent setup` to write a default config.
//! Use `clippy-agent ask <question>` to query the history from a terminal.

use clap::Parser;
use clippy_agent::ai;
use clippy_agent::cli::{Cli, Commands};
use clippy_agent::clipboard::ClipboardService;
use clippy_agent::config::{self, Config, DEFAULT_CONFIG};
use clippy_agent::daemon::{AnswerPipeline, Daemon};
use clippy_agent::focus::{FocusProvider, SystemFocus};
use clippy_agent::history::History;
use clippy_agent::inject::{ReplacementEngine, ReplacementTiming};
use clippy_agent::item::{ClipboardItem, ItemId};
use clippy_agent::permissions;
use clippy_agent::status::StatusHub;
use clippy_agent::store::ItemStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("clippy_agent={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(hotkey) = cli.hotkey {
        config.hotkey.capture = hotkey;
    }
    if let Some(endpoint) = cli.endpoint {
        config.ai.endpoint = endpoint;
    }
    if cli.no_clipboard {
        config.clipboard.enabled = false;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = Daemon::new(config);
            daemon.run().await?;
        }

        Commands::Ask { question, app } => {
            run_ask(&config, &question, app).await?;
        }

        Commands::History { limit, json } => {
            let history = open_history(&config)?;
            print_history(&history.list(limit)?, json)?;
        }

        Commands::Delete { id } => {
            let history = open_history(&config)?;
            let item = history.delete(&parse_id(&id)?).await?;
            println!("Deleted {} ({})", item.id, item.preview(40));
        }

        Commands::Favorite { id, off } => {
            let history = open_history(&config)?;
            let id = parse_id(&id)?;
            history.set_favorite(&id, !off)?;
            println!("{} {}", if off { "Unfavorited" } else { "Favorited" }, id);
        }

        Commands::Clear { keep_favorites } => {
            let history = open_history(&config)?;
            let removed = history.clear(keep_favorites).await?;
            println!("Removed {} items", removed);
        }

        Commands::Permissions { request } => {
            if request {
                permissions::request_access();
            }
            show_permissions();
        }

        Commands::Status { follow, format } => {
            run_status(&config, follow, &format)?;
        }

        Commands::Suggest => {
            signal_daemon(libc::SIGUSR1)?;
        }

        Commands::Config => {
            show_config(&config)?;
        }

        Commands::Setup { force } => {
            run_setup(&config, force)?;
        }
    }

    Ok(())
}

fn parse_id(id: &str) -> anyhow::Result<ItemId> {
    ItemId::parse(id).map_err(|e| anyhow::anyhow!("Invalid item id {:?}: {}", id, e))
}

fn open_store(config: &Config) -> anyhow::Result<Arc<ItemStore>> {
    config.ensure_directories()?;
    Ok(Arc::new(ItemStore::open(&config.database_path())?))
}

/// History with the vector index attached, so deletes cascade
fn open_history(config: &Config) -> anyhow::Result<History> {
    let store = open_store(config)?;
    let backends = ai::create_backends(&config.ai)?;
    Ok(History::new(store, backends.index))
}

/// Rank and answer from the terminal; nothing is typed anywhere
async fn run_ask(config: &Config, question: &str, app: Option<String>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let backends = ai::create_backends(&config.ai)?;
    let focus: Arc<dyn FocusProvider> = Arc::new(SystemFocus);
    let engine = Arc::new(ReplacementEngine::for_platform(
        focus,
        ReplacementTiming::from_config(&config.replacement),
    ));
    let (hub, _commands) = StatusHub::new();
    let pipeline = AnswerPipeline::new(
        store,
        backends.collaborator,
        backends.index,
        engine,
        ClipboardService::system(),
        Arc::new(hub),
        config.ranking.clone(),
    );

    let (suggestions, answer) = pipeline.ask(question, app.as_deref()).await;

    if suggestions.is_empty() {
        println!("No matching clipboard items.");
    } else {
        println!("Suggestions:");
        for (i, s) in suggestions.iter().enumerate() {
            println!("  {}. [{:.3}] {}", i + 1, s.score, s.item.preview(70));
        }
    }

    match answer {
        Ok(Some(text)) => println!("\n{}", text),
        Ok(None) => println!("\nNo answer."),
        Err(e) => eprintln!("\nAnswer unavailable: {}", e),
    }
    Ok(())
}

fn print_history(items: &[ClipboardItem], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("History is empty.");
        return Ok(());
    }

    for item in items {
        let when = item.timestamp.with_timezone(&chrono::Local);
        println!(
            "{} {} {:<16} {:<10} {}{}",
            item.id,
            when.format("%Y-%m-%d %H:%M"),
            item.content_type,
            item.source_app.as_deref().unwrap_or("-"),
            if item.is_favorite { "★ " } else { "" },
            item.preview(60)
        );
        if !item.tags.is_empty() {
            println!("{:>38} tags: {}", "", item.tags.join(", "));
        }
    }
    Ok(())
}

fn show_permissions() {
    let report = permissions::report();
    println!("Permissions\n");
    println!("  Input Monitoring: {}", report.input_monitoring);
    println!("  Accessibility:    {}", report.accessibility);
    println!();
    for line in &report.guidance {
        println!("  {}", line);
    }
}

/// Send a signal to the running daemon via its PID file
fn signal_daemon(signal: libc::c_int) -> anyhow::Result<()> {
    let pid_path = Config::runtime_dir().join("pid");
    let pid: libc::pid_t = std::fs::read_to_string(&pid_path)
        .map_err(|_| anyhow::anyhow!("Daemon not running (no PID file at {:?})", pid_path))?
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid PID file {:?}: {}", pid_path, e))?;

    let result = unsafe { libc::kill(pid, signal) };
    if result != 0 {
        anyhow::bail!(
            "Failed to signal daemon (pid {}): {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}

/// Run the setup command
fn run_setup(config: &Config, force: bool) -> anyhow::Result<()> {
    println!("clippy-agent Setup\n");
    println!("==================\n");

    println!("Creating directories...");
    config.ensure_directories()?;
    println!("  ✓ Config directory: {:?}", Config::config_dir().unwrap_or_default());
    println!("  ✓ Data directory: {:?}", config.data_dir());

    if let Some(config_path) = Config::default_path() {
        if !config_path.exists() || force {
            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            println!("  ✓ Wrote config: {:?}", config_path);
        } else {
            println!("  Config file exists: {:?} (use --force to overwrite)", config_path);
        }
    }

    println!("\nChecking permissions...");
    let report = permissions::report();
    let mut all_ok = report.all_granted();
    if all_ok {
        println!("  ✓ Input Monitoring and Accessibility granted");
    } else {
        for line in &report.guidance {
            println!("  ✗ {}", line);
        }
        println!("    Run: clippy-agent permissions --request");
    }

    println!("\nChecking AI sidecar...");
    let client = ai::SidecarClient::new(&config.ai)?;
    match client.health() {
        Ok(_) => println!("  ✓ Sidecar reachable at {}", client.endpoint()),
        Err(e) => {
            println!("  ✗ Sidecar not reachable at {}: {}", client.endpoint(), e);
            println!("    Tags, answers and vector search stay off until it runs.");
            all_ok = false;
        }
    }

    println!("\n---");
    if all_ok {
        println!("✓ All checks passed! Run 'clippy-agent' to start.");
    } else {
        println!("✗ Some checks failed. Please fix the issues above.");
    }
    Ok(())
}

/// Run the status command - show current daemon state
fn run_status(config: &Config, follow: bool, format: &str) -> anyhow::Result<()> {
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: state_file is not configured.");
        eprintln!();
        eprintln!("To enable status monitoring, add to your config.toml:");
        eprintln!();
        eprintln!("  state_file = \"auto\"");
        std::process::exit(1);
    };

    let read_state = || {
        std::fs::read_to_string(&state_path)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "stopped".to_string())
    };
    let print_state = |state: &str| {
        if format == "json" {
            println!("{}", format_state_json(state));
        } else {
            println!("{}", state);
        }
    };

    let state = read_state();
    print_state(&state);
    if !follow {
        return Ok(());
    }

    // Follow mode: watch for changes
    use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    // Watch the parent directory; the file may not exist yet
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
    }

    let mut last_state = state;

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_event)) => {
                let new_state = read_state();
                if new_state != last_state {
                    print_state(&new_state);
                    last_state = new_state;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {:?}", e);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // Daemon stopped and removed the file
                if !state_path.exists() && last_state != "stopped" {
                    print_state("stopped");
                    last_state = "stopped".to_string();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

/// Format state as JSON for status bars
fn format_state_json(state: &str) -> String {
    let (text, class, tooltip) = match state {
        "capturing" => ("✎", "capturing", "Type your question, press the hotkey to finish"),
        "thinking" => ("…", "thinking", "Looking through your clipboard"),
        "done" => ("✓", "done", "Answer inserted"),
        "error" => ("!", "error", "Something went wrong"),
        "idle" => ("📋", "idle", "clippy-agent ready"),
        "stopped" => ("", "stopped", "clippy-agent not running"),
        _ => ("?", "unknown", "Unknown state"),
    };

    serde_json::json!({
        "text": text,
        "class": class,
        "tooltip": tooltip,
        "alt": state,
    })
    .to_string()
}

/// Show current configuration
fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");
    println!("{}", toml::to_string_pretty(config)?);

    println!("---");
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
    println!("History: {:?}", config.database_path());
    if let Some(state) = config.resolve_state_file() {
        println!("State file: {:?}", state);
    }

    Ok(())
}
