//! clippy-agent: clipboard memory that answers where you type
//!
//! This library provides the core functionality for:
//! - Watching the clipboard and storing what is copied (text and images)
//! - Enriching stored items with tags, image descriptions and embeddings
//! - Capturing a question typed between two presses of a global hotkey
//! - Ranking clipboard history against the question and the focused app
//! - Replacing the typed question in place with the answer
//!
//! # Architecture
//!
//! ```text
//!                            ┌─────────────────────────────────────┐
//!                            │          Daemon (actor)             │
//!                            └─────────────────────────────────────┘
//!                                            │
//!                   ┌────────────────────────┼────────────────────────┐
//!                   │                        │                        │
//!                   ▼                        ▼                        ▼
//!          ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//!          │  Event Tap   │         │  Clipboard   │         │    Phase     │
//!          │   (rdev)     │         │   Monitor    │         │  + Status    │
//!          └──────────────┘         └──────────────┘         └──────────────┘
//!                   │                        │
//!                   │ hotkey / keys          │ new item
//!                   ▼                        ▼
//!          ┌──────────────┐         ┌──────────────┐        ┌──────────────┐
//!          │   Capture    │         │  Enrichment  │◀──────▶│ AI sidecar   │
//!          │   Session    │         │   Pipeline   │        │ (ureq)       │
//!          └──────────────┘         └──────────────┘        └──────────────┘
//!                   │                        │                     ▲
//!                   │ question               ▼                     │
//!                   │               ┌──────────────┐               │
//!                   │               │  Item Store  │               │
//!                   │               │  (SQLite)    │               │
//!                   │               └──────────────┘               │
//!                   ▼                        │                     │
//!          ┌─────────────────────────────────▼─────────────────────┴─────┐
//!          │         Answer Pipeline: rank ──▶ answer ──▶ replace         │
//!          └──────────────────────────────────────────────────────────────┘
//!                                            │
//!                                            ▼
//!                                   ┌──────────────┐
//!                                   │ Replacement  │
//!                                   │ CGEvent/enigo│
//!                                   │  + AX writer │
//!                                   └──────────────┘
//! ```

pub mod ai;
pub mod capture;
pub mod cli;
pub mod clipboard;
pub mod config;
pub mod daemon;
pub mod enrich;
pub mod error;
pub mod focus;
pub mod history;
pub mod inject;
pub mod item;
pub mod notification;
pub mod permissions;
pub mod ranking;
pub mod state;
pub mod status;
pub mod store;
pub mod tap;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use daemon::{AnswerPipeline, Daemon};
pub use error::{ClippyError, Result};
