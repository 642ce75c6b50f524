//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Cluster chosen by the router
//!     → subset.rs (narrow the host set by metadata criteria, fallback policy)
//!     → drop unhealthy hosts (health flag registry)
//!     → hash policy present? pick candidates[hash % len] sorted by address
//!     → otherwise apply the cluster's strategy:
//!         - random.rs (weighted random, the default)
//!         - round_robin.rs (rotate through weights)
//!         - least_conn.rs (fewest active requests)
//!     → one host, or NoHealthyUpstream
//! ```
//!
//! # Design Decisions
//! - Strategies only see healthy, already-filtered candidates
//! - Weight 0 never wins a weighted pick
//! - Selection never blocks; the only side effects are atomic counters

use std::fmt;

use crate::cluster::host::HostRef;
use crate::config::LbPolicy;

pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod subset;

pub use least_conn::LeastRequest;
pub use random::WeightedRandom;
pub use round_robin::RoundRobin;
pub use subset::ClusterLoadBalancer;

/// A host selection strategy over a healthy candidate list.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Short name used in logs and metrics labels.
    fn name(&self) -> &'static str;

    /// Pick one of `candidates`, or `None` if none is eligible.
    fn next_host(&self, candidates: &[HostRef]) -> Option<HostRef>;
}

/// Instantiate the strategy configured for a cluster.
pub fn from_policy(policy: LbPolicy) -> Box<dyn LoadBalancer> {
    match policy {
        LbPolicy::Random => Box::new(WeightedRandom::new()),
        LbPolicy::RoundRobin => Box::new(RoundRobin::new()),
        LbPolicy::LeastRequest => Box::new(LeastRequest::new()),
    }
}

/// Sum of weights of the eligible (weight > 0) candidates.
pub(crate) fn total_weight(candidates: &[HostRef]) -> u64 {
    candidates.iter().map(|h| u64::from(h.weight())).sum()
}

/// Walk cumulative weights to the host owning `point` in `0..total_weight`.
pub(crate) fn host_at_weight(candidates: &[HostRef], mut point: u64) -> Option<HostRef> {
    for host in candidates {
        let weight = u64::from(host.weight());
        if point < weight {
            return Some(host.clone());
        }
        point -= weight;
    }
    None
}
