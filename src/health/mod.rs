//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → TCP connect probe per host
//!     → FAILED_ACTIVE_HC in flags.rs
//!
//! Passive health checks (passive.rs):
//!     Request failure reported
//!     → Increment failure streak
//!     → FAILED_OUTLIER_CHECK in flags.rs, cleared by sweep
//!
//! Flags (flags.rs):
//!     One bitmask per address; healthy iff zero
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary and own separate bits
//! - State transitions require consecutive successes/failures
//! - Health state is per-address, not per-pool or per-host-object

pub mod active;
pub mod flags;
pub mod passive;

pub use active::HealthMonitor;
pub use flags::{HealthFlag, HealthFlagHandle, HealthFlagRegistry};
pub use passive::{OutlierDetector, RequestOutcome};
