//! Address-keyed health flag registry.
//!
//! # Responsibilities
//! - Hand out one shared bitmask per host address
//! - Set/clear individual failure bits without clobbering other writers
//! - Answer "is this host healthy" with a single atomic load
//!
//! # Design Decisions
//! - A host is healthy iff its bitmask is zero
//! - Entries are created on first reference and never removed; the address
//!   space is bounded by the configured clusters
//! - Writers use `fetch_or` / `fetch_and`, so concurrent updates of different
//!   bits never lose each other

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// One reason a host is considered unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HealthFlag(u64);

impl HealthFlag {
    /// Active health check failed.
    pub const FAILED_ACTIVE_HC: HealthFlag = HealthFlag(0x1);
    /// Ejected by passive outlier detection.
    pub const FAILED_OUTLIER_CHECK: HealthFlag = HealthFlag(0x2);
    /// Marked down by an operator or control plane.
    pub const EXTERNAL_DOWN: HealthFlag = HealthFlag(0x4);
    /// Removed from its host set, waiting for in-flight work to finish.
    pub const DRAINING: HealthFlag = HealthFlag(0x8);

    /// Wrap a raw bit pattern.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bit pattern.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True when every bit of `other` is also set in `self`.
    pub const fn contains(self, other: HealthFlag) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for HealthFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Shared handle to one address's bitmask. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct HealthFlagHandle(Arc<AtomicU64>);

impl HealthFlagHandle {
    /// Set a failure bit (atomic OR).
    pub fn set(&self, flag: HealthFlag) {
        self.0.fetch_or(flag.bits(), Ordering::AcqRel);
    }

    /// Clear a failure bit (atomic AND-NOT).
    pub fn clear(&self, flag: HealthFlag) {
        self.0.fetch_and(!flag.bits(), Ordering::AcqRel);
    }

    /// Current bitmask.
    pub fn flags(&self) -> HealthFlag {
        HealthFlag(self.0.load(Ordering::Acquire))
    }

    /// True iff no failure bit is set.
    pub fn is_healthy(&self) -> bool {
        self.0.load(Ordering::Acquire) == 0
    }

    /// True when both handles point at the same bitmask.
    pub fn same_as(&self, other: &HealthFlagHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Process-wide store of health bitmasks keyed by host address.
///
/// Share one instance via `Arc` between hosts, checkers and admin paths.
#[derive(Debug, Default)]
pub struct HealthFlagRegistry {
    flags: DashMap<String, HealthFlagHandle>,
}

impl HealthFlagRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle for `address`, creating it on first use.
    ///
    /// Concurrent first calls for the same address resolve to one handle.
    pub fn handle(&self, address: &str) -> HealthFlagHandle {
        if let Some(existing) = self.flags.get(address) {
            return existing.value().clone();
        }
        self.flags
            .entry(address.to_string())
            .or_insert_with(|| HealthFlagHandle(Arc::new(AtomicU64::new(0))))
            .value()
            .clone()
    }

    /// Health of `address` without creating an entry; unknown is healthy.
    pub fn is_healthy(&self, address: &str) -> bool {
        self.flags
            .get(address)
            .map(|h| h.is_healthy())
            .unwrap_or(true)
    }

    /// Number of addresses seen so far.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// True when no address has been referenced yet.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}
