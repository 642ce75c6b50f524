//! Upstream clusters and their hosts.
//!
//! # Data Flow
//! ```text
//! ClusterConfig
//!     → manager.rs builds Cluster { HostSet, ClusterLoadBalancer, ClusterStats }
//!     → host.rs UpstreamHost per endpoint, health bound by address
//!
//! Per request:
//!     manager.rs choose_host → load_balancer pipeline over one HostSet snapshot
//!     manager.rs conn_pool_for → conn_pool registry → check_and_init
//! ```
//!
//! # Design Decisions
//! - Host sets are replaced whole, never edited in place
//! - Host health is keyed by address, so it survives host object replacement

pub mod host;
pub mod host_set;
pub mod manager;
pub mod stats;

pub use host::{Host, HostRef, Metadata, UpstreamHost};
pub use host_set::HostSet;
pub use manager::{Cluster, ClusterManager};
pub use stats::{ClusterStats, HostStats, RequestGuard};
