//! Weighted round-robin load balancing strategy.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cluster::host::HostRef;
use crate::load_balancer::{host_at_weight, total_weight, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter and walks it over the cumulative weights, so a
/// host of weight 2 gets two consecutive turns per cycle.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicU64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn next_host(&self, candidates: &[HostRef]) -> Option<HostRef> {
        let total = total_weight(candidates);
        if total == 0 {
            return None;
        }
        let turn = self.counter.fetch_add(1, Ordering::Relaxed);
        host_at_weight(candidates, turn % total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::host::UpstreamHost;
    use crate::health::flags::HealthFlagRegistry;

    #[test]
    fn test_round_robin() {
        let registry = HealthFlagRegistry::new();
        let lb = RoundRobin::new();
        let b1 = UpstreamHost::new("web", "127.0.0.1:8080", &registry).into_ref();
        let b2 = UpstreamHost::new("web", "127.0.0.1:8081", &registry).into_ref();
        let backends = vec![b1.clone(), b2.clone()];

        let s1 = lb.next_host(&backends).unwrap();
        assert_eq!(s1.address_string(), b1.address_string());

        let s2 = lb.next_host(&backends).unwrap();
        assert_eq!(s2.address_string(), b2.address_string());

        let s3 = lb.next_host(&backends).unwrap();
        assert_eq!(s3.address_string(), b1.address_string());
    }

    #[test]
    fn test_round_robin_weights() {
        let registry = HealthFlagRegistry::new();
        let lb = RoundRobin::new();
        let backends = vec![
            UpstreamHost::new("web", "127.0.0.1:1", &registry).with_weight(0).into_ref(),
            UpstreamHost::new("web", "127.0.0.1:2", &registry).into_ref(),
            UpstreamHost::new("web", "127.0.0.1:3", &registry).with_weight(2).into_ref(),
        ];

        let picks: Vec<_> = (0..6)
            .map(|_| lb.next_host(&backends).unwrap().address_string().to_string())
            .collect();
        assert_eq!(
            picks,
            ["127.0.0.1:2", "127.0.0.1:3", "127.0.0.1:3", "127.0.0.1:2", "127.0.0.1:3", "127.0.0.1:3"]
        );
    }
}
