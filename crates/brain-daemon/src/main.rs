//! Strategy Brain daemon
//!
//! `braind run` keeps a brain alive with its escalation and reconciliation
//! sweeps, restoring and saving its snapshot when one is configured;
//! `braind replay` drives a fresh brain through a JSON script and prints
//! where it ended up.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use brain_daemon::{log_events, BrainConfig, Catalog, Replay, ReplayScript, Scheduler, Snapshot};
use brain_pipeline::{ManualClock, StrategyBrain};
use brain_types::BrainMode;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Strategy Brain daemon CLI
#[derive(Parser)]
#[command(name = "braind")]
#[command(about = "Strategy Brain - gated decision pipeline daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BRAIN_CONFIG")]
    config: Option<String>,

    /// Starting mode (training, supervised, autonomous)
    #[arg(short, long, env = "BRAIN_MODE")]
    mode: Option<BrainMode>,

    /// Log level
    #[arg(long, env = "BRAIN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "BRAIN_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sweeps until interrupted
    Run {
        /// Catalog file, overrides `catalog.path`
        #[arg(long)]
        catalog: Option<String>,
    },

    /// Execute a replay script against a fresh brain
    Replay {
        /// Script file
        script: String,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        BrainConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json;

    init_tracing(&config.logging.level, config.logging.json);

    match cli.command {
        Command::Run { catalog } => run(config, catalog).await,
        Command::Replay { script, pretty } => replay(config, &script, pretty).await,
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(config: BrainConfig, catalog: Option<String>) -> anyhow::Result<()> {
    let brain = Arc::new(StrategyBrain::new(&config.settings()).context("invalid settings")?);

    let catalog = catalog
        .or_else(|| config.catalog.path.clone())
        .map(|path| Catalog::from_path(&path))
        .transpose()?;
    let snapshot_path = config.state.snapshot_path.as_ref().map(PathBuf::from);
    let snapshot = match &snapshot_path {
        Some(path) => Snapshot::load(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?,
        None => None,
    };

    match (snapshot, &catalog) {
        (Some(snapshot), catalog) => {
            let report = snapshot
                .restore(&brain, catalog.as_ref())
                .context("failed to restore snapshot")?;
            if !report.needs_review.is_empty() {
                tracing::warn!(
                    needs_review = ?report.needs_review,
                    "Recovered decisions need a human to complete them"
                );
            }
        }
        (None, Some(catalog)) => catalog.register(&brain)?,
        (None, None) => {
            tracing::warn!("No catalog configured; starting without channels or insights")
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %brain.mode(),
        "Strategy Brain starting"
    );

    let events = tokio::spawn(log_events(brain.subscribe()));
    let scheduler = Scheduler::new(brain.clone(), snapshot_path);
    let scheduler_handle = tokio::spawn(scheduler.clone().start());

    shutdown_signal().await?;
    tracing::info!("Strategy Brain shutting down");

    scheduler.stop().await;
    scheduler_handle.await.context("scheduler task panicked")?;
    events.abort();
    scheduler.save_snapshot().context("failed to save snapshot")?;

    let status = brain.get_brain_status();
    tracing::info!(
        active = status.active_decision_count,
        approvals_required = status.approvals_required,
        health = ?status.health_status,
        "Final status"
    );
    Ok(())
}

async fn replay(config: BrainConfig, path: &str, pretty: bool) -> anyhow::Result<()> {
    let script = ReplayScript::from_path(path)?;
    let clock = Arc::new(ManualClock::starting_now());
    let brain = StrategyBrain::new_with_clock(&config.settings(), clock.clone())
        .context("invalid settings")?;
    let report = Replay::new(&brain, clock).run(&script).await?;

    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .context("failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        result = terminate => {
            result?;
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
    Ok(())
}
