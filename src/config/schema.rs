//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every section
//! is `#[serde(default)]` so a minimal file is valid.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conn_pool::ProtocolName;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Logging, metrics and log sink settings.
    pub observability: ObservabilityConfig,

    /// Active health checking.
    pub health_check: HealthCheckConfig,

    /// Passive outlier detection.
    pub outlier_detection: OutlierDetectionConfig,

    /// Connection pool settings shared by every cluster.
    pub conn_pool: ConnPoolConfig,

    /// Upstream clusters.
    pub clusters: Vec<ClusterConfig>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Optional buffered rolling log file.
    pub log_sink: Option<LogSinkConfig>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9091".to_string(),
            log_sink: None,
        }
    }
}

/// Buffered log file settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSinkConfig {
    /// Live log file path.
    pub path: String,

    /// Messages buffered before `print` starts dropping or waiting.
    #[serde(default = "default_log_buffer")]
    pub buffer_size: usize,

    /// Seconds between file rolls.
    #[serde(default = "default_roll_interval")]
    pub roll_interval_secs: u64,
}

fn default_log_buffer() -> usize {
    1000
}

fn default_roll_interval() -> u64 {
    86_400
}

impl LogSinkConfig {
    pub fn roll_interval(&self) -> Duration {
        Duration::from_secs(self.roll_interval_secs)
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 2,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Passive outlier detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutlierDetectionConfig {
    pub enabled: bool,

    /// Consecutive reported failures before ejection.
    pub consecutive_failures: u32,

    /// How long an ejected host stays out, in seconds.
    pub base_ejection_secs: u64,
}

impl Default for OutlierDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            consecutive_failures: 5,
            base_ejection_secs: 30,
        }
    }
}

impl OutlierDetectionConfig {
    pub fn ejection_duration(&self) -> Duration {
        Duration::from_secs(self.base_ejection_secs)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnPoolConfig {
    /// Upper bound for `check_and_init`, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ConnPoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3000,
        }
    }
}

impl ConnPoolConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Host selection strategy of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LbPolicy {
    #[default]
    Random,
    RoundRobin,
    LeastRequest,
}

/// What to do when no host matches the request's metadata criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubsetFallback {
    /// Select among all hosts of the cluster.
    #[default]
    AnyEndpoint,
    /// Fail with no healthy upstream.
    NoFallback,
}

/// One upstream cluster.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Unique cluster name.
    pub name: String,

    /// Protocol of the pools built for this cluster's hosts.
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolName,

    #[serde(default)]
    pub lb_policy: LbPolicy,

    #[serde(default)]
    pub subset_fallback: SubsetFallback,

    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

fn default_protocol() -> ProtocolName {
    ProtocolName::new("tcp")
}

/// One upstream endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Endpoint address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Display name; defaults to the address.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Weight for weighted strategies (default: 1, 0 = never picked).
    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default)]
    pub tls: bool,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_weight() -> u32 {
    1
}

impl HostConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            hostname: None,
            weight: default_weight(),
            tls: false,
            metadata: BTreeMap::new(),
        }
    }
}
