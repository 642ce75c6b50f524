//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Cluster names unique, host addresses unique and parsable per cluster
//! - Validate value ranges (intervals, timeouts, thresholds > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: UpstreamConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::UpstreamConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("cluster name must not be empty")]
    EmptyClusterName,

    #[error("duplicate cluster '{0}'")]
    DuplicateCluster(String),

    #[error("cluster '{cluster}': duplicate host '{address}'")]
    DuplicateHost { cluster: String, address: String },

    #[error("cluster '{cluster}': invalid host address '{address}'")]
    InvalidAddress { cluster: String, address: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Check everything serde cannot.
pub fn validate_config(config: &UpstreamConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let hc = &config.health_check;
    if hc.enabled {
        non_zero(&mut errors, "health_check.interval_secs", hc.interval_secs);
        non_zero(&mut errors, "health_check.timeout_secs", hc.timeout_secs);
        non_zero(&mut errors, "health_check.unhealthy_threshold", hc.unhealthy_threshold.into());
        non_zero(&mut errors, "health_check.healthy_threshold", hc.healthy_threshold.into());
    }

    let od = &config.outlier_detection;
    if od.enabled {
        non_zero(&mut errors, "outlier_detection.consecutive_failures", od.consecutive_failures.into());
        non_zero(&mut errors, "outlier_detection.base_ejection_secs", od.base_ejection_secs);
    }

    non_zero(&mut errors, "conn_pool.connect_timeout_ms", config.conn_pool.connect_timeout_ms);

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(obs.metrics_address.clone()));
    }
    if let Some(sink) = &obs.log_sink {
        non_zero(&mut errors, "observability.log_sink.buffer_size", sink.buffer_size as u64);
        non_zero(&mut errors, "observability.log_sink.roll_interval_secs", sink.roll_interval_secs);
    }

    let mut names = HashSet::new();
    for cluster in &config.clusters {
        if cluster.name.is_empty() {
            errors.push(ValidationError::EmptyClusterName);
        } else if !names.insert(cluster.name.as_str()) {
            errors.push(ValidationError::DuplicateCluster(cluster.name.clone()));
        }

        let mut addresses = HashSet::new();
        for host in &cluster.hosts {
            if host.address.parse::<SocketAddr>().is_err() {
                errors.push(ValidationError::InvalidAddress {
                    cluster: cluster.name.clone(),
                    address: host.address.clone(),
                });
            }
            if !addresses.insert(host.address.as_str()) {
                errors.push(ValidationError::DuplicateHost {
                    cluster: cluster.name.clone(),
                    address: host.address.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn non_zero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::ZeroValue { field });
    }
}
