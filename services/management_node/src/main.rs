//! Management node binary - runs a whole management cluster in process
//!
//! Usage:
//!   management_node --config config/cluster.toml
//!   management_node --config config/cluster.toml --duration-secs 30 --json-logs

mod node;

use anyhow::{Context, Result};
use clap::Parser;
use config::{expand_path, ClusterConfig};
use network::{FabricConfig, LocalFabric};
use node::{start_cluster, ClusterNode};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "management_node")]
#[command(about = "In-process management federation")]
#[command(version)]
struct Args {
    /// Path to the cluster definition
    #[arg(short, long)]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Stop after this many seconds instead of waiting for CTRL+C
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Seconds between reports
    #[arg(long, default_value_t = 5)]
    report_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let path = expand_path(&args.config)?;
    let cluster = ClusterConfig::load(&path)
        .with_context(|| format!("Failed to load cluster from {}", path.display()))?;
    info!(
        cluster = %cluster.name,
        nodes = cluster.nodes.len(),
        refresh_policy = cluster.management.connector.refresh_policy.as_str(),
        "Starting management cluster"
    );

    let fabric = LocalFabric::new(FabricConfig {
        request_timeout: cluster.management.connector.refresh_request_timeout(),
        ..FabricConfig::default()
    });
    let nodes = start_cluster(&fabric, &cluster)?;

    let run = run_reports(&nodes, Duration::from_secs(args.report_interval_secs.max(1)));
    match args.duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = run => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("Run duration elapsed"),
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
            }
        }
        None => {
            tokio::select! {
                _ = run => {}
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
            }
        }
    }

    for node in nodes.iter().rev() {
        node.shutdown();
    }
    info!(
        tasks = fabric
            .metrics()
            .tasks_delivered
            .load(std::sync::atomic::Ordering::Relaxed),
        "Cluster stopped"
    );
    Ok(())
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));

    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Read every cache through the managing members and log each node's report.
async fn run_reports(nodes: &[ClusterNode], interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut tick = 0u64;
    loop {
        ticker.tick().await;
        for node in nodes {
            node.touch_caches(tick);
        }

        for node in nodes.iter().filter(|n| n.management().connector().is_managing()) {
            let management = node.management();
            let names = match management.query_names("type=Cache,*", None).await {
                Ok(names) => names,
                Err(e) => {
                    warn!(node = node.label(), error = %e, "Cache query failed");
                    continue;
                }
            };
            for name in names {
                match management.get_attribute(&name, "Size").await {
                    Ok(size) => info!(node = node.label(), %name, %size, "Cache size"),
                    Err(e) => warn!(node = node.label(), %name, error = %e, "Read failed"),
                }
            }
        }

        for node in nodes {
            match serde_json::to_string(&node.report()) {
                Ok(report) => info!(node = node.label(), %report, "Node report"),
                Err(e) => warn!(node = node.label(), error = %e, "Failed to serialize report"),
            }
        }
        tick += 1;
    }
}
