//! Weighted random load balancing strategy.

use rand::Rng;

use crate::cluster::host::HostRef;
use crate::load_balancer::{host_at_weight, total_weight, LoadBalancer};

/// Picks a host with probability `weight / total_weight`.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for WeightedRandom {
    fn name(&self) -> &'static str {
        "random"
    }

    fn next_host(&self, candidates: &[HostRef]) -> Option<HostRef> {
        let total = total_weight(candidates);
        if total == 0 {
            return None;
        }
        let point = rand::thread_rng().gen_range(0..total);
        host_at_weight(candidates, point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::host::UpstreamHost;
    use crate::health::flags::HealthFlagRegistry;

    fn hosts(weights: &[u32]) -> Vec<HostRef> {
        let registry = HealthFlagRegistry::new();
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                UpstreamHost::new("web", &format!("127.0.0.1:{}", 8000 + i), &registry)
                    .with_weight(*w)
                    .into_ref()
            })
            .collect()
    }

    #[test]
    fn test_weighted_distribution() {
        let lb = WeightedRandom::new();
        let backends = hosts(&[1, 1, 2]);
        let mut counts = [0usize; 3];

        for _ in 0..10_000 {
            let picked = lb.next_host(&backends).unwrap();
            let idx = backends
                .iter()
                .position(|h| h.address_string() == picked.address_string())
                .unwrap();
            counts[idx] += 1;
        }

        // 25% / 25% / 50% within a generous band
        assert!((2000..3000).contains(&counts[0]), "{:?}", counts);
        assert!((2000..3000).contains(&counts[1]), "{:?}", counts);
        assert!((4500..5500).contains(&counts[2]), "{:?}", counts);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let lb = WeightedRandom::new();
        let backends = hosts(&[0, 3]);
        for _ in 0..1000 {
            assert_eq!(lb.next_host(&backends).unwrap().address_string(), "127.0.0.1:8001");
        }

        assert!(lb.next_host(&hosts(&[0, 0])).is_none());
        assert!(lb.next_host(&[]).is_none());
    }
}
