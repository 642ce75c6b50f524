//! Cluster table and request control flow.
//!
//! # Responsibilities
//! - Own every configured cluster
//! - Select a host and resolve its initialised connection pool
//! - Apply host-set updates, draining hosts that disappear
//! - External health overrides by address

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::cluster::host::{HostRef, UpstreamHost};
use crate::cluster::host_set::HostSet;
use crate::cluster::stats::ClusterStats;
use crate::config::{ClusterConfig, HostConfig, UpstreamConfig};
use crate::conn_pool::{ConnectionPool, PoolRegistry, ProtocolName};
use crate::error::UpstreamError;
use crate::health::flags::{HealthFlag, HealthFlagRegistry};
use crate::load_balancer::{self, ClusterLoadBalancer};
use crate::routing::context::LoadBalancerContext;

/// One named group of interchangeable hosts.
#[derive(Debug)]
pub struct Cluster {
    name: String,
    protocol: ProtocolName,
    hosts: HostSet,
    lb: ClusterLoadBalancer,
    stats: Arc<ClusterStats>,
}

impl Cluster {
    fn from_config(config: &ClusterConfig, health: &HealthFlagRegistry) -> Self {
        let stats = Arc::new(ClusterStats::default());
        let lb = ClusterLoadBalancer::new(
            config.name.clone(),
            load_balancer::from_policy(config.lb_policy),
            config.subset_fallback,
            stats.clone(),
        );
        Self {
            name: config.name.clone(),
            protocol: config.protocol.clone(),
            hosts: HostSet::new(build_hosts(&config.name, &config.hosts, health)),
            lb,
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> &ProtocolName {
        &self.protocol
    }

    pub fn hosts(&self) -> &HostSet {
        &self.hosts
    }

    pub fn stats(&self) -> &Arc<ClusterStats> {
        &self.stats
    }

    pub fn lb_policy_name(&self) -> &'static str {
        self.lb.strategy_name()
    }

    /// Pick one healthy host for the request.
    pub fn choose_host(&self, ctx: &dyn LoadBalancerContext) -> Result<HostRef, UpstreamError> {
        self.lb.choose_host(&self.hosts, ctx)
    }
}

fn build_hosts(cluster: &str, configs: &[HostConfig], health: &HealthFlagRegistry) -> Vec<HostRef> {
    configs
        .iter()
        .map(|c| UpstreamHost::from_config(cluster, c, health).into_ref())
        .collect()
}

/// Registry of clusters plus the shared health and pool registries.
#[derive(Debug)]
pub struct ClusterManager {
    clusters: DashMap<String, Arc<Cluster>>,
    health: Arc<HealthFlagRegistry>,
    pools: Arc<PoolRegistry>,
    connect_timeout: Duration,
}

impl ClusterManager {
    pub fn new(
        health: Arc<HealthFlagRegistry>,
        pools: Arc<PoolRegistry>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            clusters: DashMap::new(),
            health,
            pools,
            connect_timeout,
        }
    }

    /// Build every configured cluster.
    pub fn from_config(
        config: &UpstreamConfig,
        health: Arc<HealthFlagRegistry>,
        pools: Arc<PoolRegistry>,
    ) -> Self {
        let manager = Self::new(health, pools, config.conn_pool.connect_timeout());
        for cluster in &config.clusters {
            manager.add_cluster(cluster);
        }
        manager
    }

    /// Add or replace a cluster.
    pub fn add_cluster(&self, config: &ClusterConfig) -> Arc<Cluster> {
        let cluster = Arc::new(Cluster::from_config(config, &self.health));
        tracing::info!(
            cluster = %cluster.name,
            protocol = %cluster.protocol,
            lb_policy = cluster.lb_policy_name(),
            hosts = cluster.hosts.len(),
            "Cluster added"
        );
        if !self.pools.is_registered(&cluster.protocol) {
            tracing::warn!(cluster = %cluster.name, protocol = %cluster.protocol, "Cluster protocol has no pool factory");
        }
        self.clusters.insert(config.name.clone(), cluster.clone());
        cluster
    }

    pub fn cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        self.clusters.get(name).map(|c| c.value().clone())
    }

    pub fn cluster_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clusters.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    pub fn health_registry(&self) -> &Arc<HealthFlagRegistry> {
        &self.health
    }

    pub fn pool_registry(&self) -> &Arc<PoolRegistry> {
        &self.pools
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    fn require(&self, name: &str) -> Result<Arc<Cluster>, UpstreamError> {
        self.cluster(name)
            .ok_or_else(|| UpstreamError::UnknownCluster(name.to_string()))
    }

    /// Select a host of `cluster` for the request.
    pub fn choose_host(
        &self,
        cluster: &str,
        ctx: &dyn LoadBalancerContext,
    ) -> Result<HostRef, UpstreamError> {
        self.require(cluster)?.choose_host(ctx)
    }

    /// Select a host and return its pool, initialised and ready for streams.
    pub async fn conn_pool_for(
        &self,
        cluster: &str,
        ctx: &dyn LoadBalancerContext,
    ) -> Result<Arc<dyn ConnectionPool>, UpstreamError> {
        let cluster = self.require(cluster)?;
        let host = cluster.choose_host(ctx)?;
        let pool = self.pools.get_or_create(&host, &cluster.protocol)?;

        if !pool.check_and_init(self.connect_timeout).await {
            let reason = format!(
                "pool {} after check_and_init ({}ms budget)",
                pool.state(),
                self.connect_timeout.as_millis()
            );
            tracing::warn!(
                cluster = %cluster.name,
                address = %host.address_string(),
                reason = %reason,
                "Connection pool init failed"
            );
            return Err(UpstreamError::ConnectionInitFailed {
                address: host.address_string().to_string(),
                reason,
            });
        }

        tracing::debug!(cluster = %cluster.name, address = %host.address_string(), "Pool ready for request");
        Ok(pool)
    }

    /// Replace the host set of `cluster`.
    ///
    /// Hosts whose address disappears are flagged `DRAINING` and their pools
    /// shut down gracefully. Surviving addresses keep their pools, rebound to
    /// the new host objects.
    pub fn update_hosts(&self, cluster: &str, hosts: &[HostConfig]) -> Result<(), UpstreamError> {
        let cluster = self.require(cluster)?;
        // Surviving addresses keep their counters and in-flight requests.
        let next: Vec<HostRef> = hosts
            .iter()
            .map(|config| {
                let host = UpstreamHost::from_config(&cluster.name, config, &self.health);
                match cluster.hosts.get(&config.address) {
                    Some(existing) => host.with_stats(existing.stats().clone()),
                    None => host,
                }
                .into_ref()
            })
            .collect();
        let next_addresses: HashSet<&str> = next.iter().map(|h| h.address_string()).collect();

        for host in &next {
            if host.health_flag().contains(HealthFlag::DRAINING) {
                tracing::info!(address = %host.address_string(), "Host re-added, clearing drain");
                host.clear_health_flag(HealthFlag::DRAINING);
            }
        }

        let previous = cluster.hosts.update_hosts(next.clone());

        for host in &next {
            if previous.iter().any(|p| p.address_string() == host.address_string()) {
                self.pools.update_host(host);
            }
        }

        for old in previous.iter() {
            let address = old.address_string();
            if next_addresses.contains(address) || self.served_elsewhere(&cluster.name, address) {
                continue;
            }
            tracing::info!(cluster = %cluster.name, address = %address, "Host removed, draining");
            old.set_health_flag(HealthFlag::DRAINING);
            self.pools.remove_host(address);
        }

        tracing::info!(cluster = %cluster.name, hosts = next.len(), "Host set updated");
        Ok(())
    }

    fn served_elsewhere(&self, cluster: &str, address: &str) -> bool {
        self.clusters
            .iter()
            .any(|c| c.key() != cluster && c.value().hosts.get(address).is_some())
    }

    /// Force a host out of rotation regardless of checker results.
    pub fn mark_host_down(&self, address: &str) {
        tracing::info!(address, "Host marked down");
        self.health.handle(address).set(HealthFlag::EXTERNAL_DOWN);
    }

    /// Undo [`ClusterManager::mark_host_down`].
    pub fn mark_host_up(&self, address: &str) {
        tracing::info!(address, "Host marked up");
        self.health.handle(address).clear(HealthFlag::EXTERNAL_DOWN);
    }

    /// Every host of every cluster, one entry per address.
    pub fn all_hosts(&self) -> Vec<HostRef> {
        let mut seen = HashSet::new();
        let mut hosts = Vec::new();
        for cluster in self.clusters.iter() {
            for host in cluster.value().hosts.hosts().iter() {
                if seen.insert(host.address_string().to_string()) {
                    hosts.push(host.clone());
                }
            }
        }
        hosts
    }

    /// Look a host up by address across clusters.
    pub fn find_host(&self, address: &str) -> Option<HostRef> {
        self.clusters
            .iter()
            .find_map(|c| c.value().hosts.get(address))
    }

    pub fn close_all_pools(&self) {
        tracing::info!(pools = self.pools.len(), "Closing all connection pools");
        self.pools.close_all();
    }
}
