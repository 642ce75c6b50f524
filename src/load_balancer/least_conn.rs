//! Least active request load balancing strategy.

use crate::cluster::host::HostRef;
use crate::load_balancer::LoadBalancer;

/// Least active requests selector.
/// Selects the eligible host with the fewest in-flight requests.
#[derive(Debug, Default)]
pub struct LeastRequest;

impl LeastRequest {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastRequest {
    fn name(&self) -> &'static str {
        "least_request"
    }

    fn next_host(&self, candidates: &[HostRef]) -> Option<HostRef> {
        // In case of tie, the first one is selected (stability)
        candidates
            .iter()
            .filter(|h| h.weight() > 0)
            .min_by_key(|h| h.stats().rq_active())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::host::UpstreamHost;
    use crate::health::flags::HealthFlagRegistry;

    #[test]
    fn test_least_request() {
        let registry = HealthFlagRegistry::new();
        let lb = LeastRequest::new();
        let b1 = UpstreamHost::new("web", "127.0.0.1:8080", &registry).into_ref();
        let b2 = UpstreamHost::new("web", "127.0.0.1:8081", &registry).into_ref();

        // artificially increase requests on b1
        let _g1 = b1.stats().start_request();

        let backends = vec![b1.clone(), b2.clone()];

        // Should pick b2 (0 requests)
        let s1 = lb.next_host(&backends).unwrap();
        assert_eq!(s1.address_string(), b2.address_string());

        // now b2 has 2, b1 has 1
        let _g2 = b2.stats().start_request();
        let _g3 = b2.stats().start_request();

        let s2 = lb.next_host(&backends).unwrap();
        assert_eq!(s2.address_string(), b1.address_string());
    }

    #[test]
    fn test_zero_weight_skipped() {
        let registry = HealthFlagRegistry::new();
        let lb = LeastRequest::new();
        let idle = UpstreamHost::new("web", "127.0.0.1:1", &registry).with_weight(0).into_ref();
        let busy = UpstreamHost::new("web", "127.0.0.1:2", &registry).into_ref();
        let _g = busy.stats().start_request();

        let picked = lb.next_host(&[idle.clone(), busy.clone()]).unwrap();
        assert_eq!(picked.address_string(), "127.0.0.1:2");
        assert!(lb.next_host(&[idle]).is_none());
    }
}
