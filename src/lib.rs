//! codetick - WakaTime-compatible command-line coding activity tracker.
//!
//! Editor plugins invoke the binary once per meaningful editor event. The
//! event ("heartbeat") is enriched with project, branch, language, and
//! dependency metadata, then sent to the API or buffered to an on-disk
//! queue for later synchronization.

pub mod api;
pub mod apikey;
pub mod backoff;
pub mod cli;
pub mod commands;
pub mod config;
pub mod deps;
pub mod error;
pub mod filestats;
pub mod heartbeat;
pub mod language;
pub mod logfile;
pub mod matcher;
pub mod offline;
pub mod pipeline;
pub mod project;
pub mod ratelimit;
pub mod remote;
pub mod state;

pub use cli::Cli;
pub use config::Settings;
pub use error::Error;
pub use heartbeat::{Heartbeat, HeartbeatResult};
pub use matcher::Matcher;
pub use pipeline::{Pipeline, Sender, Stage};
