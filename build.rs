//! Build script for clippy-agent
//!
//! Generates man pages from CLI definitions using clap_mangen.

use clap::CommandFactory;
use clap_mangen::Man;
use std::env;
use std::fs::{self, File};
use std::io::Error;
use std::path::{Path, PathBuf};

// Include the CLI module
include!("src/cli.rs");

fn main() -> Result<(), Error> {
    // Only generate man pages for release builds or when explicitly requested
    let profile = env::var("PROFILE").unwrap_or_default();
    let generate = env::var("CLIPPY_GEN_MANPAGES").is_ok() || profile == "release";

    if !generate {
        return Ok(());
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| "target".to_string()));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    // clippy-agent.1, then clippy-agent-<sub>.1 at every depth
    render_man_pages(&Cli::command(), "clippy-agent", &man_dir)?;

    // Tell cargo to rerun if CLI definitions change
    println!("cargo:rerun-if-changed=src/cli.rs");

    // Print location of generated man pages
    println!(
        "cargo:warning=Man pages generated in: {}",
        man_dir.display()
    );

    Ok(())
}

fn render_man_pages(cmd: &clap::Command, page: &str, man_dir: &Path) -> Result<(), Error> {
    let mut file = File::create(man_dir.join(format!("{}.1", page)))?;
    Man::new(cmd.clone()).render(&mut file)?;

    for subcommand in cmd.get_subcommands() {
        let name = subcommand.get_name();
        if name == "help" {
            continue;
        }
        render_man_pages(subcommand, &format!("{}-{}", page, name), man_dir)?;
    }
    Ok(())
}
