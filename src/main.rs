//! Upstream core daemon.
//!
//! Loads the cluster configuration, registers the built-in connection pool
//! factories and runs the health checkers until ctrl-c.
//!
//! ```text
//!   config.toml ──▶ ClusterManager ──▶ HostSet / ClusterLoadBalancer
//!                        │
//!                        ├──▶ PoolRegistry (tcp factory)
//!                        │
//!   HealthMonitor ───────┤  FAILED_ACTIVE_HC
//!   OutlierDetector ─────┘  FAILED_OUTLIER_CHECK
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use upstream_core::config::{load_config, UpstreamConfig};
use upstream_core::conn_pool::{tcp, PoolRegistry};
use upstream_core::health::{HealthFlagRegistry, HealthMonitor, OutlierDetector};
use upstream_core::observability::{logging, metrics, LogSink};
use upstream_core::{ClusterManager, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "upstream-core", version, about = "Upstream cluster manager")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => UpstreamConfig::default(),
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "upstream-core starting");

    if args.check {
        tracing::info!(clusters = config.clusters.len(), "Configuration valid");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let log_sink = match &config.observability.log_sink {
        Some(sink) => Some(LogSink::from_config(sink).await?),
        None => None,
    };

    let health = Arc::new(HealthFlagRegistry::new());
    let pools = Arc::new(PoolRegistry::new());
    tcp::register(&pools);

    let clusters = Arc::new(ClusterManager::from_config(&config, health, pools));
    tracing::info!(
        clusters = ?clusters.cluster_names(),
        connect_timeout_ms = config.conn_pool.connect_timeout_ms,
        "Clusters loaded"
    );

    let shutdown = Shutdown::new();

    let monitor = HealthMonitor::new(clusters.clone(), config.health_check.clone());
    let monitor_task = tokio::spawn(monitor.run(shutdown.subscribe()));

    let detector = Arc::new(OutlierDetector::new(config.outlier_detection.clone()));
    let detector_task = tokio::spawn(detector.run(shutdown.subscribe()));

    if let Some(sink) = &log_sink {
        let line = format!("{} upstream-core started\n", chrono::Local::now().to_rfc3339());
        sink.print(line, false).await;
    }

    shutdown.trigger_on_ctrl_c().await;

    for (name, task) in [("health monitor", monitor_task), ("outlier detector", detector_task)] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task failed");
        }
    }

    clusters.close_all_pools();

    if let Some(sink) = log_sink {
        let line = format!("{} upstream-core stopped\n", chrono::Local::now().to_rfc3339());
        sink.print(line, false).await;
        sink.close().await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
