//! Per-cluster selection pipeline: subset, health, hash, strategy.

use std::sync::Arc;

use crate::cluster::host::HostRef;
use crate::cluster::host_set::{self, HostSet};
use crate::cluster::stats::ClusterStats;
use crate::config::SubsetFallback;
use crate::error::UpstreamError;
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;
use crate::routing::context::LoadBalancerContext;

/// Chooses one healthy host of a cluster for a request.
#[derive(Debug)]
pub struct ClusterLoadBalancer {
    cluster: String,
    strategy: Box<dyn LoadBalancer>,
    fallback: SubsetFallback,
    stats: Arc<ClusterStats>,
}

impl ClusterLoadBalancer {
    pub fn new(
        cluster: impl Into<String>,
        strategy: Box<dyn LoadBalancer>,
        fallback: SubsetFallback,
        stats: Arc<ClusterStats>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            strategy,
            fallback,
            stats,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Run the full selection over one snapshot of `hosts`.
    pub fn choose_host(
        &self,
        hosts: &HostSet,
        ctx: &dyn LoadBalancerContext,
    ) -> Result<HostRef, UpstreamError> {
        let snapshot = hosts.hosts();
        let candidates = self.subset(&snapshot, ctx)?;
        let mut healthy = host_set::healthy(&candidates);

        if healthy.is_empty() {
            return Err(self.no_healthy(candidates.len()));
        }

        if let Some(policy) = ctx.hash_policy() {
            let hash = policy.generate_hash(ctx);
            // Weight-0 hosts only take part when nothing else is left.
            if healthy.iter().any(|h| h.weight() > 0) {
                healthy.retain(|h| h.weight() > 0);
            }
            healthy.sort_by(|a, b| a.address_string().cmp(b.address_string()));
            let host = healthy[(hash % healthy.len() as u64) as usize].clone();
            tracing::debug!(
                cluster = %self.cluster,
                address = %host.address_string(),
                hash,
                "Host selected by hash"
            );
            self.stats.inc_selected(true);
            metrics::record_lb_selected(&self.cluster, "hash");
            return Ok(host);
        }

        match self.strategy.next_host(&healthy) {
            Some(host) => {
                self.stats.inc_selected(false);
                metrics::record_lb_selected(&self.cluster, self.strategy.name());
                Ok(host)
            }
            None => Err(self.no_healthy(candidates.len())),
        }
    }

    /// Narrow the snapshot by the request's metadata criteria.
    fn subset(
        &self,
        snapshot: &[HostRef],
        ctx: &dyn LoadBalancerContext,
    ) -> Result<Vec<HostRef>, UpstreamError> {
        let criteria = match ctx.metadata_match_criteria() {
            Some(c) if !c.is_empty() => c,
            _ => return Ok(snapshot.to_vec()),
        };

        let matched = host_set::matching(snapshot, criteria);
        if !matched.is_empty() {
            return Ok(matched);
        }

        match self.fallback {
            SubsetFallback::AnyEndpoint => {
                tracing::debug!(
                    cluster = %self.cluster,
                    criteria = %criteria,
                    "Empty subset, falling back to all hosts"
                );
                self.stats.inc_subset_fallback();
                metrics::record_subset_fallback(&self.cluster);
                Ok(snapshot.to_vec())
            }
            SubsetFallback::NoFallback => {
                tracing::debug!(
                    cluster = %self.cluster,
                    criteria = %criteria,
                    "Empty subset and fallback disabled"
                );
                Err(self.no_healthy(0))
            }
        }
    }

    fn no_healthy(&self, candidates: usize) -> UpstreamError {
        tracing::debug!(cluster = %self.cluster, candidates, "No healthy upstream");
        self.stats.inc_no_healthy();
        metrics::record_no_healthy_upstream(&self.cluster);
        UpstreamError::NoHealthyUpstream {
            cluster: self.cluster.clone(),
        }
    }
}
