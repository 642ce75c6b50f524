//! Connection pool factory registry.
//!
//! # Responsibilities
//! - Map protocol names to pool constructors
//! - Record whether a protocol multiplexes streams over one connection
//! - Own the live pool for every (host address, protocol) key
//!
//! # Design Decisions
//! - Registering a protocol twice replaces the earlier constructor; last
//!   registration wins so tests and plugins can substitute implementations
//! - Pools are built exactly once per key: the map only holds the shard lock
//!   long enough to fetch a per-key `OnceCell`, and the constructor runs
//!   under that cell alone, so unrelated keys are never blocked
//! - A `Closed` pool found in the map is replaced, once per call

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::cluster::host::HostRef;
use crate::conn_pool::{ConnectionPool, PoolState, ProtocolName};
use crate::error::UpstreamError;
use crate::observability::metrics;

/// Constructor producing a pool for one host. Must not perform network I/O.
pub type PoolFactory = Arc<dyn Fn(HostRef) -> Arc<dyn ConnectionPool> + Send + Sync>;

type PoolCell = Arc<OnceCell<Arc<dyn ConnectionPool>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    address: String,
    protocol: ProtocolName,
}

/// Process-wide protocol → pool registry. Share via `Arc`.
#[derive(Default)]
pub struct PoolRegistry {
    factories: DashMap<ProtocolName, PoolFactory>,
    multiplexing: DashMap<ProtocolName, bool>,
    pools: DashMap<PoolKey, PoolCell>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `protocol` to a pool constructor, replacing any earlier binding.
    pub fn register_pool_factory<F>(&self, protocol: impl Into<ProtocolName>, factory: F)
    where
        F: Fn(HostRef) -> Arc<dyn ConnectionPool> + Send + Sync + 'static,
    {
        let protocol = protocol.into();
        if self
            .factories
            .insert(protocol.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::info!(protocol = %protocol, "Pool factory overridden");
        } else {
            tracing::debug!(protocol = %protocol, "Pool factory registered");
        }
    }

    /// Record whether pools for `protocol` may multiplex streams.
    pub fn register_conn_pool_factory(&self, protocol: impl Into<ProtocolName>, supports_multiplexing: bool) {
        self.multiplexing.insert(protocol.into(), supports_multiplexing);
    }

    /// Multiplexing capability recorded for `protocol`, if any.
    pub fn supports_multiplexing(&self, protocol: &ProtocolName) -> Option<bool> {
        self.multiplexing.get(protocol).map(|v| *v.value())
    }

    pub fn is_registered(&self, protocol: &ProtocolName) -> bool {
        self.factories.contains_key(protocol)
    }

    /// Build a new, unshared pool for `host`.
    pub fn create_connection_pool(
        &self,
        host: HostRef,
        protocol: &ProtocolName,
    ) -> Result<Arc<dyn ConnectionPool>, UpstreamError> {
        // Clone the factory out so no map guard is held while it runs.
        let factory = self
            .factories
            .get(protocol)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| UpstreamError::UnknownProtocol(protocol.clone()))?;

        let pool = factory(host);
        metrics::record_pool_created(protocol.as_str());
        Ok(pool)
    }

    /// The live pool for `(host, protocol)`, constructing it exactly once.
    pub fn get_or_create(
        &self,
        host: &HostRef,
        protocol: &ProtocolName,
    ) -> Result<Arc<dyn ConnectionPool>, UpstreamError> {
        if !self.is_registered(protocol) {
            return Err(UpstreamError::UnknownProtocol(protocol.clone()));
        }

        let key = PoolKey {
            address: host.address_string().to_string(),
            protocol: protocol.clone(),
        };

        loop {
            let cell: PoolCell = self.pools.entry(key.clone()).or_default().value().clone();
            let mut built = false;
            let pool = cell
                .get_or_try_init(|| {
                    tracing::debug!(
                        address = %key.address,
                        protocol = %key.protocol,
                        "Creating connection pool"
                    );
                    built = true;
                    self.create_connection_pool(host.clone(), protocol)
                })?
                .clone();

            // A pool this call just built is returned as is, even if the
            // factory handed it out closed.
            if built || pool.state() != PoolState::Closed {
                return Ok(pool);
            }

            // Only evict the cell we saw; a racing caller may have replaced it.
            self.pools.remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        }
    }

    /// The live pool for a key, without creating one.
    pub fn get(&self, address: &str, protocol: &ProtocolName) -> Option<Arc<dyn ConnectionPool>> {
        let key = PoolKey {
            address: address.to_string(),
            protocol: protocol.clone(),
        };
        self.pools.get(&key).and_then(|cell| cell.get().cloned())
    }

    /// Every constructed pool serving `address`, across protocols.
    pub fn pools_for_address(&self, address: &str) -> Vec<Arc<dyn ConnectionPool>> {
        self.pools
            .iter()
            .filter(|e| e.key().address == address)
            .filter_map(|e| e.value().get().cloned())
            .collect()
    }

    /// Rebind every pool of `host`'s address to the new host object.
    pub fn update_host(&self, host: &HostRef) {
        for pool in self.pools_for_address(host.address_string()) {
            pool.update_host(host.clone());
        }
    }

    /// Drop every pool of `address`, draining them gracefully.
    pub fn remove_host(&self, address: &str) {
        let mut removed = Vec::new();
        self.pools.retain(|key, cell| {
            if key.address == address {
                removed.extend(cell.get().cloned());
                false
            } else {
                true
            }
        });
        for pool in removed {
            tracing::debug!(address, protocol = %pool.protocol(), "Shutting down pool of removed host");
            pool.shutdown();
        }
    }

    /// Close every pool immediately and forget them.
    pub fn close_all(&self) {
        let pools: Vec<_> = self
            .pools
            .iter()
            .filter_map(|e| e.value().get().cloned())
            .collect();
        self.pools.clear();
        for pool in pools {
            pool.close();
        }
    }

    /// Number of pool keys currently tracked.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let protocols: Vec<String> = self.factories.iter().map(|e| e.key().to_string()).collect();
        f.debug_struct("PoolRegistry")
            .field("protocols", &protocols)
            .field("pools", &self.pools.len())
            .finish()
    }
}
