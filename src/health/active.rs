//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every host with a TCP connect
//! - Set or clear `FAILED_ACTIVE_HC` once a streak crosses its threshold

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time;

use crate::cluster::host::HostRef;
use crate::cluster::manager::ClusterManager;
use crate::config::HealthCheckConfig;
use crate::health::flags::HealthFlag;
use crate::observability::metrics;

#[derive(Debug, Default, Clone, Copy)]
struct ProbeStreak {
    successes: u32,
    failures: u32,
}

pub struct HealthMonitor {
    clusters: Arc<ClusterManager>,
    config: HealthCheckConfig,
    streaks: DashMap<String, ProbeStreak>,
}

impl HealthMonitor {
    pub fn new(clusters: Arc<ClusterManager>, config: HealthCheckConfig) -> Self {
        Self {
            clusters,
            config,
            streaks: DashMap::new(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            timeout = self.config.timeout_secs,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every host once, concurrently.
    pub async fn check_all(&self) {
        let timeout = self.config.timeout();
        let mut probes = JoinSet::new();
        for host in self.clusters.all_hosts() {
            probes.spawn(async move {
                let healthy = probe(host.address_string(), timeout).await;
                (host, healthy)
            });
        }

        while let Some(result) = probes.join_next().await {
            match result {
                Ok((host, healthy)) => self.record_result(&host, healthy),
                Err(e) => tracing::error!(error = %e, "Health probe task failed"),
            }
        }
    }

    /// Feed one probe outcome into the host's streak.
    pub fn record_result(&self, host: &HostRef, healthy: bool) {
        let address = host.address_string();
        let mut streak = self.streaks.entry(address.to_string()).or_default();
        let flagged = host.health_flag().contains(HealthFlag::FAILED_ACTIVE_HC);

        if healthy {
            streak.failures = 0;
            streak.successes = streak.successes.saturating_add(1);
            if flagged && streak.successes >= self.config.healthy_threshold {
                host.clear_health_flag(HealthFlag::FAILED_ACTIVE_HC);
                tracing::info!(address = %address, "Host passed health checks, back in rotation");
            }
        } else {
            streak.successes = 0;
            streak.failures = streak.failures.saturating_add(1);
            if !flagged && streak.failures >= self.config.unhealthy_threshold {
                host.set_health_flag(HealthFlag::FAILED_ACTIVE_HC);
                tracing::warn!(
                    address = %address,
                    failures = streak.failures,
                    "Host failed health checks, removed from rotation"
                );
            }
        }
        drop(streak);

        metrics::record_host_health(address, host.health());
    }
}

async fn probe(address: &str, timeout: Duration) -> bool {
    match time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::warn!(address = %address, error = %e, "Health check failed: connection error");
            false
        }
        Err(_) => {
            tracing::warn!(address = %address, "Health check failed: timeout");
            false
        }
    }
}
