//! Wirelog daemon - standalone host for the TCP log broadcaster
//!
//! Runs the broadcaster and feeds it the process's own vitals as a
//! periodic diagnostic stream. Connect with `nc <host> 6001` to tail it;
//! interception switches on with the first client and off with the last.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use wirelog_broadcaster::{Broadcaster, BroadcasterConfig};

use crate::config::DaemonConfig;

#[derive(Parser, Debug)]
#[command(
    name = "wirelog-daemon",
    version,
    about = "Streams this process's log output to TCP clients"
)]
struct Args {
    /// TCP port to listen on (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Queued-line bound between deliveries (overrides the config file)
    #[arg(long)]
    queue_cap: Option<usize>,

    /// Seconds between diagnostic reports (overrides the config file)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Alternate config file location
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DaemonConfig::load(args.config)
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(cap) = args.queue_cap {
        config.queue_cap = cap;
    }
    if let Some(secs) = args.interval_secs {
        config.interval_secs = secs;
    }

    // A dedicated daemon should fail loudly when its one port is taken;
    // embedded hosts would call Broadcaster::start and carry on degraded.
    let broadcaster = Broadcaster::try_start(BroadcasterConfig {
        bind_addr: ([0, 0, 0, 0], config.port).into(),
        queue_cap: config.queue_cap,
    })
    .await
    .context("Failed to start log broadcaster")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(broadcaster.layer())
        .init();

    info!("wirelog daemon v{} starting", env!("CARGO_PKG_VERSION"));
    info!("configuration loaded from {}", config.config_path.display());
    if let Some(addr) = broadcaster.local_addr() {
        info!("log stream on {} (try: nc localhost {})", addr, config.port);
    }

    let feed = tokio::spawn(diagnostic_feed(broadcaster.clone(), config.interval_secs));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutting down");
    feed.abort();

    Ok(())
}

/// Periodic report of the daemon's own vitals, emitted through the normal
/// tracing macros like any hosted application's log traffic would be.
/// While no client is connected each tick costs an atomic load.
async fn diagnostic_feed(broadcaster: Broadcaster, interval_secs: u64) {
    let started = chrono::Local::now();
    let pid = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // interval fires immediately; swallow that so the first report is spaced
    ticker.tick().await;

    let mut last_dropped = 0u64;
    loop {
        ticker.tick().await;

        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let (mem_mb, cpu) = sys
            .process(pid)
            .map(|p| (p.memory() / 1_048_576, p.cpu_usage()))
            .unwrap_or((0, 0.0));
        let uptime = chrono::Local::now()
            .signed_duration_since(started)
            .num_seconds();

        info!(
            "up {}s, mem {} MB, cpu {:.1}%, clients {}",
            uptime,
            mem_mb,
            cpu,
            broadcaster.client_count()
        );

        let dropped = broadcaster.dropped_lines();
        if dropped > last_dropped {
            warn!("{} lines dropped from the outgoing queue", dropped - last_dropped);
            last_dropped = dropped;
        }
    }
}
