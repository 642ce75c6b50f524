//! Upstream cluster management core.
//!
//! Tracks backend host health, hands out per-host connection pools keyed by
//! protocol, and picks the host that serves each request.

pub mod cluster;
pub mod config;
pub mod conn_pool;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod routing;

pub use cluster::{ClusterManager, Host, HostRef, UpstreamHost};
pub use config::UpstreamConfig;
pub use conn_pool::{ConnectionPool, PoolRegistry, PoolState, ProtocolName};
pub use error::UpstreamError;
pub use health::{HealthFlag, HealthFlagRegistry};
pub use lifecycle::Shutdown;
pub use routing::{LoadBalancerContext, RequestContext};
