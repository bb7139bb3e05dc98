//! Command-line interface for voxstate
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Real-time speech activity detector
#[derive(Parser, Debug)]
#[command(name = "voxstate", version, about = "Real-time speech activity detector")]
pub struct Cli {
    /// Subcommand to execute (default: run the detector)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: transitions, -vv: every chunk, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (see `voxstate devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Read raw s16le mono PCM from a file or FIFO instead of a microphone
    #[arg(long, value_name = "PATH", conflicts_with = "device")]
    pub pcm_input: Option<PathBuf>,

    /// Directory for the signal CSV files
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write the CSV files from a background thread
    #[arg(long)]
    pub background_sinks: bool,

    /// Stop after this long. Examples: 30s, 5m, 1h30m
    #[arg(long, short = 'd', value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Emit state changes as JSON lines on stdout
    #[arg(long)]
    pub json: bool,
}

/// Parse a run duration.
///
/// Bare numbers are seconds; anything else goes through `humantime`
/// (`30s`, `5m`, `1h30m`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Inspect configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
