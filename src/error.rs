//! Error taxonomy for the upstream core.
//!
//! Every error here is a value handed back to the caller. Nothing in the
//! core retries on its own or terminates the process; the router/retry layer
//! decides what to do next.

use thiserror::Error;

use crate::conn_pool::{PoolState, ProtocolName};

/// Errors surfaced by host selection and connection pool management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// No pool factory is registered for the requested protocol.
    #[error("no connection pool factory registered for protocol {0}")]
    UnknownProtocol(ProtocolName),

    /// The load balancer found zero eligible hosts.
    #[error("no healthy upstream in cluster {cluster}")]
    NoHealthyUpstream { cluster: String },

    /// A stream was requested from a pool that is not `Ready`.
    #[error("connection pool for {address} is not ready (state: {state})")]
    PoolNotReady { address: String, state: PoolState },

    /// Connection establishment failed or timed out; transient.
    #[error("connection to {address} failed: {reason}")]
    ConnectionInitFailed { address: String, reason: String },

    /// The router named a cluster the manager does not know.
    #[error("unknown cluster {0}")]
    UnknownCluster(String),
}

impl UpstreamError {
    /// Whether the caller may reasonably retry against another host.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::PoolNotReady { .. } | UpstreamError::ConnectionInitFailed { .. }
        )
    }
}
