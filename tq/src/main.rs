//! tq - throttle queue demo
//!
//! CLI entry point: pushes a burst of synthetic work items through a throttle
//! and reports when each one was admitted.

use std::fs;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tokio::time::Instant;
use tracing::{debug, info};

use throttlequeue::cli::{Cli, Command, apply_overrides, get_log_path};
use throttlequeue::config::Config;
use throttlequeue::{Throttle, dispose_all};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(%level, "Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let result = match cli.command {
        Some(Command::Run {
            max,
            interval_ms,
            evenly_spaced,
            count,
            work_ms,
        }) => {
            let mut config = config;
            apply_overrides(&mut config, max, interval_ms, evenly_spaced);
            cmd_run(&config, count, work_ms).await
        }
        Some(Command::ShowConfig) => cmd_show_config(&config),
        None => cmd_run(&config, 10, 0).await,
    };

    dispose_all();
    result
}

/// Submit `count` items and print each admission offset
async fn cmd_run(config: &Config, count: usize, work_ms: u64) -> Result<()> {
    debug!(?config, count, work_ms, "cmd_run: called");
    config.validate()?;
    let throttle = Throttle::new(config.throttle.clone())?;
    let start = Instant::now();

    let submissions: Vec<_> = (0..count)
        .map(|_| {
            throttle.submit(move || async move {
                let admitted = start.elapsed();
                tokio::time::sleep(Duration::from_millis(work_ms)).await;
                admitted
            })
        })
        .collect();

    let snapshot = throttle.snapshot();
    println!(
        "Submitted {} items: {} running, {} queued",
        count, snapshot.length, snapshot.queue
    );

    let offsets = futures::future::join_all(submissions).await;
    for (i, offset) in offsets.into_iter().enumerate() {
        let offset = offset.context("Work item failed")?;
        println!("item {:>4} admitted at +{}ms", i, offset.as_millis());
    }

    let stats = throttle.stats();
    println!(
        "{} items in {}ms ({} per {}ms, evenly spaced: {}), peak queue depth {}",
        stats.total_completed,
        start.elapsed().as_millis(),
        config.throttle.max_per_interval,
        config.throttle.interval_ms,
        config.throttle.evenly_spaced,
        stats.peak_queue_depth
    );
    info!(?stats, "cmd_run: finished");
    Ok(())
}

fn cmd_show_config(config: &Config) -> Result<()> {
    debug!("cmd_show_config: called");
    print!("{}", config.to_yaml()?);
    Ok(())
}
