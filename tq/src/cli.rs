//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;

/// tq - drive a throttle queue from the command line
#[derive(Parser)]
#[command(
    name = "tq",
    about = "Run a burst of work items through a rate-limiting queue",
    version,
    after_help = "Logs are written to: ~/.local/share/throttlequeue/logs/throttlequeue.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Submit synthetic work items and print when each was admitted
    Run {
        /// Max items admitted per interval
        #[arg(short, long)]
        max: Option<u32>,

        /// Interval length in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Spread admissions evenly across the interval
        #[arg(short, long)]
        evenly_spaced: bool,

        /// Number of work items to submit
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// How long each work item runs, in milliseconds
        #[arg(short, long, default_value = "0")]
        work_ms: u64,
    },

    /// Print the effective configuration as YAML
    ShowConfig,
}

/// Apply `run` flag overrides on top of the loaded config
pub fn apply_overrides(config: &mut Config, max: Option<u32>, interval_ms: Option<u64>, evenly_spaced: bool) {
    debug!(?max, ?interval_ms, evenly_spaced, "apply_overrides: called");
    if let Some(max) = max {
        config.throttle.max_per_interval = max;
    }
    if let Some(interval_ms) = interval_ms {
        config.throttle.interval_ms = interval_ms;
    }
    if evenly_spaced {
        config.throttle.evenly_spaced = true;
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("throttlequeue")
        .join("logs")
        .join("throttlequeue.log")
}
