//! Per-host and per-cluster counters.
//!
//! Counters are plain atomics so the selection path only pays for a relaxed
//! increment. Every bump is mirrored to the `metrics` facade.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Counters for one upstream host.
#[derive(Debug)]
pub struct HostStats {
    cluster: String,
    address: String,
    rq_total: AtomicU64,
    rq_active: AtomicU64,
    rq_failure: AtomicU64,
    cx_total: AtomicU64,
    cx_connect_fail: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl HostStats {
    pub fn new(cluster: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            address: address.into(),
            rq_total: AtomicU64::new(0),
            rq_active: AtomicU64::new(0),
            rq_failure: AtomicU64::new(0),
            cx_total: AtomicU64::new(0),
            cx_connect_fail: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    pub fn rq_total(&self) -> u64 {
        self.rq_total.load(Ordering::Relaxed)
    }

    pub fn rq_active(&self) -> u64 {
        self.rq_active.load(Ordering::Relaxed)
    }

    pub fn rq_failure(&self) -> u64 {
        self.rq_failure.load(Ordering::Relaxed)
    }

    pub fn cx_total(&self) -> u64 {
        self.cx_total.load(Ordering::Relaxed)
    }

    pub fn cx_connect_fail(&self) -> u64 {
        self.cx_connect_fail.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Count a request start. Returns a guard that ends it on drop.
    pub fn start_request(self: &Arc<Self>) -> RequestGuard {
        self.rq_total.fetch_add(1, Ordering::Relaxed);
        self.rq_active.fetch_add(1, Ordering::Relaxed);
        metrics::record_host_request(&self.cluster, &self.address);
        RequestGuard {
            stats: Arc::clone(self),
        }
    }

    /// Record a failed request. Returns the new consecutive failure count.
    pub fn record_failure(&self) -> u64 {
        self.rq_failure.fetch_add(1, Ordering::Relaxed);
        metrics::record_host_failure(&self.cluster, &self.address);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a successful request, resetting the failure streak.
    pub fn record_success(&self) {
        self.reset_failure_streak();
    }

    pub fn reset_failure_streak(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_connection(&self) {
        self.cx_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.cx_connect_fail.fetch_add(1, Ordering::Relaxed);
        metrics::record_connect_failure(&self.address);
    }
}

/// RAII guard for one active request.
#[derive(Debug)]
pub struct RequestGuard {
    stats: Arc<HostStats>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.stats.rq_active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Load-balancing counters for one cluster.
#[derive(Debug, Default)]
pub struct ClusterStats {
    lb_selected: AtomicU64,
    lb_hash_selected: AtomicU64,
    lb_no_healthy: AtomicU64,
    lb_subset_fallback: AtomicU64,
}

impl ClusterStats {
    pub fn lb_selected(&self) -> u64 {
        self.lb_selected.load(Ordering::Relaxed)
    }

    pub fn lb_hash_selected(&self) -> u64 {
        self.lb_hash_selected.load(Ordering::Relaxed)
    }

    pub fn lb_no_healthy(&self) -> u64 {
        self.lb_no_healthy.load(Ordering::Relaxed)
    }

    pub fn lb_subset_fallback(&self) -> u64 {
        self.lb_subset_fallback.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_selected(&self, hashed: bool) {
        self.lb_selected.fetch_add(1, Ordering::Relaxed);
        if hashed {
            self.lb_hash_selected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn inc_no_healthy(&self) {
        self.lb_no_healthy.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_subset_fallback(&self) {
        self.lb_subset_fallback.fetch_add(1, Ordering::Relaxed);
    }
}
