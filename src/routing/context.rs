//! Per-request load balancing context.

use std::net::SocketAddr;
use std::sync::Arc;

use http::HeaderMap;

use crate::routing::hash_policy::HashPolicy;
use crate::routing::metadata::MetadataMatchCriteria;

/// Everything the load balancer may look at for one downstream request.
pub trait LoadBalancerContext: Send + Sync {
    /// Subset constraints chosen by the router, if any.
    fn metadata_match_criteria(&self) -> Option<&MetadataMatchCriteria>;

    fn downstream_headers(&self) -> Option<&HeaderMap>;

    /// Remote address of the downstream connection.
    fn downstream_remote_addr(&self) -> Option<SocketAddr>;

    /// Hash policy bound to the matched route, if any.
    fn hash_policy(&self) -> Option<&dyn HashPolicy>;
}

/// Plain owned [`LoadBalancerContext`] assembled by the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    criteria: Option<MetadataMatchCriteria>,
    headers: Option<HeaderMap>,
    remote_addr: Option<SocketAddr>,
    hash_policy: Option<Arc<dyn HashPolicy>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_criteria(mut self, criteria: MetadataMatchCriteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_hash_policy(mut self, policy: Arc<dyn HashPolicy>) -> Self {
        self.hash_policy = Some(policy);
        self
    }
}

impl LoadBalancerContext for RequestContext {
    fn metadata_match_criteria(&self) -> Option<&MetadataMatchCriteria> {
        self.criteria.as_ref()
    }

    fn downstream_headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    fn downstream_remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn hash_policy(&self) -> Option<&dyn HashPolicy> {
        self.hash_policy.as_deref()
    }
}
