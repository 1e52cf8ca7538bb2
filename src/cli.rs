// Command-line interface definitions for clippy-agent
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clippy-agent")]
#[command(author, version, about = "Clipboard memory that answers where you type")]
#[command(long_about = "
clippy-agent remembers what you copy and answers questions about it in place.

SETUP:
  1. Start the AI sidecar (default http://127.0.0.1:8000)
  2. Run: clippy-agent permissions --request (macOS: Input Monitoring, Accessibility)
  3. Run: clippy-agent setup (writes a default config)
  4. Run: clippy-agent (to start the daemon)

USAGE:
  Press the capture hotkey (Ctrl+Alt+K by default), type a question such as
  \"my tracking number\", then press the hotkey again. The question is
  replaced by the answer. Escape cancels.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the capture hotkey (e.g., "ctrl+alt+k", "cmd+shift+space")
    #[arg(long, value_name = "CHORD")]
    pub hotkey: Option<String>,

    /// Override the AI sidecar endpoint
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Disable clipboard monitoring
    #[arg(long)]
    pub no_clipboard: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Ask a question against the clipboard history and print the answer
    Ask {
        /// The question
        question: String,

        /// Rank as if this app were in front
        #[arg(long, value_name = "APP")]
        app: Option<String>,
    },

    /// List recent clipboard items
    History {
        /// Number of items to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an item (and its vector entry and image file)
    Delete {
        /// Item ID
        id: String,
    },

    /// Mark an item as favourite
    Favorite {
        /// Item ID
        id: String,

        /// Remove the favourite mark instead
        #[arg(long)]
        off: bool,
    },

    /// Delete the whole history
    Clear {
        /// Keep items marked as favourite
        #[arg(long)]
        keep_favorites: bool,
    },

    /// Check (and optionally request) OS permissions
    Permissions {
        /// Show the system prompts for missing permissions
        #[arg(long)]
        request: bool,
    },

    /// Show daemon status (for status bar integration)
    Status {
        /// Continuously output status changes
        #[arg(long)]
        follow: bool,

        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Ask the running daemon to publish suggestions for the focused app (SIGUSR1)
    Suggest,

    /// Show current configuration
    Config,

    /// Write a default config file and create data directories
    Setup {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommand_arguments() {
        let cli = Cli::try_parse_from(["clippy-agent", "history", "-n", "5", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::History { limit: 5, json: true })
        ));

        let cli = Cli::try_parse_from(["clippy-agent", "ask", "my tracking number", "--app", "Mail"])
            .unwrap();
        match cli.command {
            Some(Commands::Ask { question, app }) => {
                assert_eq!(question, "my tracking number");
                assert_eq!(app.as_deref(), Some("Mail"));
            }
            _ => panic!("expected ask"),
        }

        assert!(Cli::try_parse_from(["clippy-agent"]).unwrap().command.is_none());
    }

    #[test]
    fn test_every_subcommand_gets_a_man_page_name() {
        fn pages(cmd: &clap::Command, page: &str, out: &mut Vec<String>) {
            out.push(page.to_string());
            for sub in cmd.get_subcommands().filter(|s| s.get_name() != "help") {
                pages(sub, &format!("{}-{}", page, sub.get_name()), out);
            }
        }

        let mut names = Vec::new();
        pages(&Cli::command(), "clippy-agent", &mut names);
        assert_eq!(names[0], "clippy-agent");
        for expected in ["clippy-agent-history", "clippy-agent-status", "clippy-agent-setup"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        assert_eq!(names.len(), Cli::command().get_subcommands().count() + 1);
    }
}
