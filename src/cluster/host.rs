//! Upstream host abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream endpoint (identity, metadata, weight)
//! - Delegate health state to the shared flag registry
//! - Carry the host's stats block

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::cluster::stats::HostStats;
use crate::config::HostConfig;
use crate::health::flags::{HealthFlag, HealthFlagHandle, HealthFlagRegistry};

/// Ordered key/value labels used for subset matching.
pub type Metadata = BTreeMap<String, String>;

/// Shared reference to a host. Host sets own these; subsets clone the `Arc`.
pub type HostRef = Arc<dyn Host>;

/// One upstream endpoint.
///
/// Implementations must keep every method non-blocking; they are called on
/// the request path.
pub trait Host: Send + Sync + fmt::Debug {
    fn hostname(&self) -> &str;

    /// Unique key of the host inside its cluster.
    fn address_string(&self) -> &str;

    fn cluster_name(&self) -> &str;

    fn metadata(&self) -> &Metadata;

    /// Relative weight for weighted selection; 0 excludes the host.
    fn weight(&self) -> u32;

    fn support_tls(&self) -> bool;

    fn stats(&self) -> &Arc<HostStats>;

    /// Current failure bitmask.
    fn health_flag(&self) -> HealthFlag;

    fn set_health_flag(&self, flag: HealthFlag);

    fn clear_health_flag(&self, flag: HealthFlag);

    /// A host is healthy iff no failure bit is set.
    fn health(&self) -> bool {
        self.health_flag().bits() == 0
    }
}

/// The standard [`Host`] built from configuration.
pub struct UpstreamHost {
    hostname: String,
    address: String,
    cluster: String,
    metadata: Metadata,
    weight: u32,
    tls: bool,
    flags: HealthFlagHandle,
    stats: Arc<HostStats>,
}

impl UpstreamHost {
    /// Create a host with weight 1, no metadata and hostname = address.
    pub fn new(cluster: &str, address: &str, registry: &HealthFlagRegistry) -> Self {
        Self {
            hostname: address.to_string(),
            address: address.to_string(),
            cluster: cluster.to_string(),
            metadata: Metadata::new(),
            weight: 1,
            tls: false,
            flags: registry.handle(address),
            stats: Arc::new(HostStats::new(cluster, address)),
        }
    }

    /// Build a host from its config entry.
    pub fn from_config(cluster: &str, config: &HostConfig, registry: &HealthFlagRegistry) -> Self {
        let mut host = Self::new(cluster, &config.address, registry)
            .with_weight(config.weight)
            .with_metadata(config.metadata.clone())
            .with_tls(config.tls);
        if let Some(hostname) = &config.hostname {
            host.hostname = hostname.clone();
        }
        host
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Share an existing stats block, e.g. when a host object is rebuilt.
    pub fn with_stats(mut self, stats: Arc<HostStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Finish building and share.
    pub fn into_ref(self) -> HostRef {
        Arc::new(self)
    }
}

impl Host for UpstreamHost {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn address_string(&self) -> &str {
        &self.address
    }

    fn cluster_name(&self) -> &str {
        &self.cluster
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn weight(&self) -> u32 {
        self.weight
    }

    fn support_tls(&self) -> bool {
        self.tls
    }

    fn stats(&self) -> &Arc<HostStats> {
        &self.stats
    }

    fn health_flag(&self) -> HealthFlag {
        self.flags.flags()
    }

    fn set_health_flag(&self, flag: HealthFlag) {
        self.flags.set(flag);
    }

    fn clear_health_flag(&self, flag: HealthFlag) {
        self.flags.clear(flag);
    }

    fn health(&self) -> bool {
        self.flags.is_healthy()
    }
}

impl fmt::Debug for UpstreamHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamHost")
            .field("hostname", &self.hostname)
            .field("address", &self.address)
            .field("cluster", &self.cluster)
            .field("weight", &self.weight)
            .field("flags", &self.flags.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_delegates_to_registry() {
        let registry = HealthFlagRegistry::new();
        let host = UpstreamHost::new("web", "127.0.0.1:8080", &registry);
        assert!(host.health());

        // A second host object for the same address shares the bitmask.
        let twin = UpstreamHost::new("web", "127.0.0.1:8080", &registry);
        host.set_health_flag(HealthFlag::FAILED_ACTIVE_HC);
        assert!(!twin.health());
        assert_eq!(twin.health_flag(), HealthFlag::FAILED_ACTIVE_HC);

        twin.clear_health_flag(HealthFlag::FAILED_ACTIVE_HC);
        assert!(host.health());
    }

    #[test]
    fn from_config_applies_fields() {
        let registry = HealthFlagRegistry::new();
        let mut metadata = Metadata::new();
        metadata.insert("version".into(), "v2".into());
        let config = HostConfig {
            address: "10.0.0.1:80".into(),
            hostname: Some("web-1".into()),
            weight: 3,
            tls: true,
            metadata,
        };

        let host = UpstreamHost::from_config("web", &config, &registry);
        assert_eq!(host.hostname(), "web-1");
        assert_eq!(host.address_string(), "10.0.0.1:80");
        assert_eq!(host.cluster_name(), "web");
        assert_eq!(host.weight(), 3);
        assert!(host.support_tls());
        assert_eq!(host.metadata().get("version").map(String::as_str), Some("v2"));
    }
}
