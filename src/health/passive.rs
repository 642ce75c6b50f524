//! Passive health checking (outlier detection).
//!
//! # Responsibilities
//! - Count consecutive request failures reported by callers
//! - Eject a host (`FAILED_OUTLIER_CHECK`) once its streak hits the threshold
//! - Return ejected hosts to rotation after the ejection period

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::cluster::host::HostRef;
use crate::config::OutlierDetectionConfig;
use crate::health::flags::HealthFlag;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one request against a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Failure,
}

#[derive(Debug)]
struct Ejection {
    host: HostRef,
    at: Instant,
}

#[derive(Debug)]
pub struct OutlierDetector {
    config: OutlierDetectionConfig,
    ejections: DashMap<String, Ejection>,
}

impl OutlierDetector {
    pub fn new(config: OutlierDetectionConfig) -> Self {
        Self {
            config,
            ejections: DashMap::new(),
        }
    }

    /// Record a request outcome. Returns `true` if this report ejected the host.
    pub fn report(&self, host: &HostRef, outcome: RequestOutcome) -> bool {
        let stats = host.stats();
        let streak = match outcome {
            RequestOutcome::Success => {
                stats.record_success();
                return false;
            }
            RequestOutcome::Failure => stats.record_failure(),
        };

        if !self.config.enabled || streak < u64::from(self.config.consecutive_failures) {
            return false;
        }

        let address = host.address_string();
        match self.ejections.entry(address.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                host.set_health_flag(HealthFlag::FAILED_OUTLIER_CHECK);
                slot.insert(Ejection {
                    host: host.clone(),
                    at: Instant::now(),
                });
            }
        }
        tracing::warn!(
            address = %address,
            consecutive_failures = streak,
            ejection_secs = self.config.base_ejection_secs,
            "Host ejected as outlier"
        );
        true
    }

    /// Return hosts whose ejection expired to rotation. Returns how many.
    pub fn sweep(&self) -> usize {
        let period = self.config.ejection_duration();
        let now = Instant::now();
        let mut restored = Vec::new();
        self.ejections.retain(|_, ejection| {
            if now.duration_since(ejection.at) >= period {
                restored.push(ejection.host.clone());
                false
            } else {
                true
            }
        });

        for host in &restored {
            host.stats().reset_failure_streak();
            host.clear_health_flag(HealthFlag::FAILED_OUTLIER_CHECK);
            tracing::info!(address = %host.address_string(), "Outlier ejection expired");
        }
        restored.len()
    }

    pub fn is_ejected(&self, address: &str) -> bool {
        self.ejections.contains_key(address)
    }

    pub fn ejected_count(&self) -> usize {
        self.ejections.len()
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Outlier detection disabled");
            return;
        }

        tracing::info!(
            consecutive_failures = self.config.consecutive_failures,
            ejection_secs = self.config.base_ejection_secs,
            "Outlier detector starting"
        );

        let mut ticker = time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Outlier detector received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
