//! CLI argument definitions for the Murmur binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use murmur_control::DEFAULT_COMBO;
use murmur_core::FsStore;

/// Murmur - push-to-talk dictation that types what you say.
#[derive(Parser, Debug)]
#[command(name = "murmur", version, about)]
pub struct CliArgs {
    /// Data directory for settings, stats, and downloaded model files.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Model to select at startup (see `murmur models` for ids).
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Push-to-talk key combination, e.g. "ctrl+space" or "ctrl+shift+d".
    #[arg(long = "hotkey")]
    pub hotkey: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start dictation (the default when no subcommand is given).
    Run,
    /// List the model catalog with download status.
    Models,
    /// Download a model's files into the local cache.
    Download {
        /// Model identifier, e.g. "base".
        id: String,
    },
}

impl CliArgs {
    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > MURMUR_DATA env var > per-user default
    /// (`%APPDATA%\murmur` on Windows, `~/.config/murmur` elsewhere).
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            return dir.clone();
        }
        if let Ok(dir) = std::env::var("MURMUR_DATA") {
            return PathBuf::from(dir);
        }
        FsStore::default_dir()
    }

    /// Resolve the push-to-talk combination.
    ///
    /// Priority: --hotkey flag > default ("ctrl+space").
    pub fn resolve_hotkey(&self) -> String {
        self.hotkey
            .clone()
            .unwrap_or_else(|| DEFAULT_COMBO.to_string())
    }

    /// Resolve the log level.
    ///
    /// Returns `None` if not overridden (use RUST_LOG or the default).
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}
