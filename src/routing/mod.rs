//! Request-derived routing hints.
//!
//! # Data Flow
//! ```text
//! Router (external) picks a route
//!     → metadata.rs (subset constraints from the route/request)
//!     → hash_policy.rs (affinity hash, if the route binds one)
//!     → context.rs (bundled with the downstream connection identity)
//!     → load balancer
//! ```
//!
//! # Design Decisions
//! - Everything here is immutable once built for a request
//! - Matching and hashing are pure and non-blocking

pub mod context;
pub mod hash_policy;
pub mod metadata;

pub use context::{LoadBalancerContext, RequestContext};
pub use hash_policy::{CookieHashPolicy, HashPolicy, HeaderHashPolicy, SourceIpHashPolicy};
pub use metadata::{MatchCriterion, MetadataMatchCriteria};
