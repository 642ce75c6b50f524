//! Host set snapshots.
//!
//! # Design Decisions
//! - The host list lives behind an `ArcSwap`; updates replace the whole list
//! - Readers take one `Arc` snapshot per selection and never see a partial update
//! - Filtered views (by metadata, by health) are computed from that snapshot
//!   on demand and never cached

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cluster::host::HostRef;
use crate::routing::metadata::MetadataMatchCriteria;

/// Ordered collection of hosts for one cluster.
#[derive(Debug)]
pub struct HostSet {
    hosts: ArcSwap<Vec<HostRef>>,
}

impl HostSet {
    pub fn new(hosts: Vec<HostRef>) -> Self {
        Self {
            hosts: ArcSwap::from_pointee(hosts),
        }
    }

    /// Stable snapshot of the current hosts.
    pub fn hosts(&self) -> Arc<Vec<HostRef>> {
        self.hosts.load_full()
    }

    /// Atomically replace the host list. Returns the previous snapshot.
    pub fn update_hosts(&self, hosts: Vec<HostRef>) -> Arc<Vec<HostRef>> {
        self.hosts.swap(Arc::new(hosts))
    }

    pub fn len(&self) -> usize {
        self.hosts.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.load().is_empty()
    }

    /// Look a host up by address in the current snapshot.
    pub fn get(&self, address: &str) -> Option<HostRef> {
        self.hosts
            .load()
            .iter()
            .find(|h| h.address_string() == address)
            .cloned()
    }

    /// Hosts of the current snapshot that pass their health check.
    pub fn healthy_hosts(&self) -> Vec<HostRef> {
        healthy(&self.hosts())
    }

    /// Hosts of the current snapshot whose metadata satisfies `criteria`.
    pub fn matching(&self, criteria: &MetadataMatchCriteria) -> Vec<HostRef> {
        matching(&self.hosts(), criteria)
    }
}

impl Default for HostSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Filter a snapshot by metadata criteria, keeping order.
pub fn matching(hosts: &[HostRef], criteria: &MetadataMatchCriteria) -> Vec<HostRef> {
    hosts
        .iter()
        .filter(|h| criteria.matches(h.metadata()))
        .cloned()
        .collect()
}

/// Filter a snapshot down to healthy hosts, keeping order.
pub fn healthy(hosts: &[HostRef]) -> Vec<HostRef> {
    hosts.iter().filter(|h| h.health()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::host::{Metadata, UpstreamHost};
    use crate::health::flags::{HealthFlag, HealthFlagRegistry};

    fn host(registry: &HealthFlagRegistry, addr: &str, version: &str) -> HostRef {
        let mut metadata = Metadata::new();
        metadata.insert("version".into(), version.into());
        UpstreamHost::new("web", addr, registry)
            .with_metadata(metadata)
            .into_ref()
    }

    #[test]
    fn snapshot_survives_swap() {
        let registry = HealthFlagRegistry::new();
        let set = HostSet::new(vec![host(&registry, "127.0.0.1:1", "v1")]);

        let before = set.hosts();
        let previous = set.update_hosts(vec![
            host(&registry, "127.0.0.1:2", "v1"),
            host(&registry, "127.0.0.1:3", "v2"),
        ]);

        assert_eq!(before.len(), 1);
        assert_eq!(previous.len(), 1);
        assert_eq!(set.len(), 2);
        assert!(set.get("127.0.0.1:3").is_some());
        assert!(set.get("127.0.0.1:1").is_none());
    }

    #[test]
    fn filtered_views_follow_current_state() {
        let registry = HealthFlagRegistry::new();
        let set = HostSet::new(vec![
            host(&registry, "127.0.0.1:1", "v1"),
            host(&registry, "127.0.0.1:2", "v2"),
            host(&registry, "127.0.0.1:3", "v2"),
        ]);

        let criteria = MetadataMatchCriteria::new([("version", "v2")]);
        assert_eq!(set.matching(&criteria).len(), 2);
        assert_eq!(set.healthy_hosts().len(), 3);

        registry.handle("127.0.0.1:2").set(HealthFlag::FAILED_ACTIVE_HC);
        assert_eq!(set.healthy_hosts().len(), 2);
        let healthy_v2 = healthy(&set.matching(&criteria));
        assert_eq!(healthy_v2.len(), 1);
        assert_eq!(healthy_v2[0].address_string(), "127.0.0.1:3");
    }
}
