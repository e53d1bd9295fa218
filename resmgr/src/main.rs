/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use resmgr::config::ResourceManagerConfig;
use resmgr::manager::ResourceManager;

// ── CLI argument definition ───────────────────────────────────────────────────

/// LRU cluster resource manager.
///
/// Example:
///   resmgr --config cluster.yaml --wait-seconds 5
#[derive(Debug, Parser)]
#[command(
    name = "resmgr",
    about = "Least-recently-used cluster resource manager",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML cluster configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Seconds to wait between scheduling iterations (overrides the file).
    #[arg(short = 'w', long = "wait-seconds", env = "RESMGR_WAIT_SECONDS")]
    wait_seconds: Option<f64>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(config = ?cli.config, wait_seconds = ?cli.wait_seconds, "resmgr starting up");

    if let Err(e) = run(cli).await {
        error!("resmgr failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Load configuration ────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => ResourceManagerConfig::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using a single default node");
            ResourceManagerConfig::default()
        }
    };
    if let Some(secs) = cli.wait_seconds {
        config.scheduler.wait_seconds = secs;
    }

    // ── Build the manager and submit seed jobs ────────────────────────────────
    let manager = ResourceManager::from_config(&config)?;
    let seeded = manager.submit_seed_jobs(&config)?;
    if !seeded.is_empty() {
        info!(jobs = seeded.len(), "seed jobs submitted");
    }
    log_node_report(&manager);

    // ── Run until a shutdown signal ───────────────────────────────────────────
    let shutdown = install_shutdown_handler()?;
    let scheduler = manager.spawn_scheduler(shutdown.clone());
    info!(
        wait = ?manager.scheduler().wait_interval(),
        "scheduler running, press Ctrl-C to stop"
    );

    scheduler.await.context("scheduler task panicked")?;

    info!(pending = manager.queue_size(), "scheduler stopped");
    log_node_report(&manager);
    Ok(())
}

/// Cancelled on SIGTERM or SIGINT.
fn install_shutdown_handler() -> Result<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    let token = CancellationToken::new();
    let token_clone = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
        token_clone.cancel();
    });

    Ok(token)
}

fn log_node_report(manager: &ResourceManager) {
    match manager.node_report() {
        Ok(nodes) => {
            info!("{} node(s):", nodes.len());
            for entry in nodes {
                info!(
                    "  [{id}]  load={load}/{cap}  address={addr}  queues={queues:?}",
                    id = entry.node.id,
                    load = entry.load,
                    cap = entry.node.capacity,
                    addr = entry.node.address,
                    queues = entry.queues,
                );
            }
        }
        Err(e) => warn!(error = %e, "could not build node report"),
    }
}
