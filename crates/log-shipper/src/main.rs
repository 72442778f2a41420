//! Log shipper binary entry point.
//!
//! Usage: log-shipper --endpoint <host:port> [--endpoint <host:port>...] [--config <file>]
//!
//! Reads newline-delimited JSON commands from stdin and ships the decoded
//! events to the configured collectors until stdin closes or Ctrl-C.

use anyhow::Context;
use clap::Parser;
use log_shipper::config::parse_endpoints;
use log_shipper::logging::init_logging;
use log_shipper::{ClientPool, LinkRegistry, ShipperConfig, ShipperManager, TcpClientPool};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Log shipper: batches log commands and forwards them to collectors.
#[derive(Parser, Debug)]
#[command(name = "log-shipper")]
#[command(about = "Batches log events and forwards them to a pool of remote collectors")]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = "LOG_SHIPPER_CONFIG")]
    config: Option<PathBuf>,

    /// Collector endpoint (host:port). Repeat or comma-separate for several.
    #[arg(long = "endpoint")]
    endpoints: Vec<String>,

    /// Events per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Dispatch workers per business.
    #[arg(long)]
    workers: Option<usize>,

    /// Throughput report interval in seconds.
    #[arg(long)]
    monitor_interval_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn build_config(args: &Args) -> anyhow::Result<ShipperConfig> {
    let mut config =
        ShipperConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let endpoints: Vec<String> = args
        .endpoints
        .iter()
        .flat_map(|raw| parse_endpoints(raw))
        .collect();
    if !endpoints.is_empty() {
        config.endpoints = endpoints;
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    if let Some(secs) = args.monitor_interval_secs {
        config.monitor_interval_secs = secs;
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_registry(config: &ShipperConfig) -> Arc<LinkRegistry> {
    let pools = config.endpoints.iter().map(|endpoint| {
        Arc::new(TcpClientPool::new(
            endpoint.clone(),
            config.max_clients_per_endpoint,
            config.connect_timeout(),
            config.request_timeout(),
        )) as Arc<dyn ClientPool>
    });
    Arc::new(LinkRegistry::from_pools(pools))
}

async fn read_commands(manager: Arc<ShipperManager>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = manager.submit_command(line.as_bytes()).await {
            debug!(error = %e, "Command not shipped");
        }
    }
    info!("Input closed");
    Ok(())
}

async fn report_throughput(manager: Arc<ShipperManager>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        for (business, snapshot) in manager.monitor_all().await {
            info!(
                business = %business,
                success = snapshot.success,
                failure = snapshot.failure,
                backlog = snapshot.backlog,
                "Throughput"
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;

    init_logging(&config.log_level, config.log_format);

    info!(
        endpoints = ?config.endpoints,
        batch_size = config.pipeline.batch_size,
        workers = config.pipeline.workers,
        "Configuration loaded"
    );

    let registry = build_registry(&config);
    let manager = Arc::new(ShipperManager::new(registry, config.pipeline.clone()));

    let reporter = tokio::spawn(report_throughput(manager.clone(), config.monitor_interval()));

    tokio::select! {
        result = read_commands(manager.clone()) => {
            if let Err(e) = result {
                warn!(error = %e, "Command reader stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    manager.shutdown().await;
    reporter.abort();
    info!("Log shipper exited");
    Ok(())
}
