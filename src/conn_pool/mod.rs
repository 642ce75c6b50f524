//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     protocol plugins → registry.rs (register_pool_factory / register_conn_pool_factory)
//!
//! Per request (after host selection):
//!     registry.rs get_or_create(host, protocol)   exactly once per key
//!     → ConnectionPool::check_and_init(timeout)   lazy connect
//!     → ConnectionPool::new_stream(receiver, listener)
//!     → listener.on_ready(stream) | listener.on_failure(error)
//!
//! Pool states (state.rs):
//!     Uninitialized → Ready → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Factories never touch the network; connecting is deferred to `check_and_init`
//! - One pool instance owns its live transport; `new_stream` is safe to call
//!   concurrently without external locking
//! - The pool's host reference is an atomically swapped cell

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cluster::host::HostRef;
use crate::error::UpstreamError;

pub mod registry;
pub mod state;
pub mod tcp;

pub use registry::{PoolFactory, PoolRegistry};
pub use state::{PoolLifecycle, PoolState};
pub use tcp::TcpConnPool;

/// Wire protocol identifier, e.g. `tcp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolName(String);

impl ProtocolName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProtocolName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ProtocolName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a stream ended before the caller finished it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamResetReason {
    /// The upstream closed or broke the connection.
    ConnectionTerminated,
    /// The pool was closed locally.
    PoolClosed,
}

/// Receives upstream data for one stream.
pub trait StreamReceiver: Send + Sync {
    fn on_data(&self, data: Bytes);

    fn on_reset(&self, reason: StreamResetReason);
}

/// Outcome callbacks for [`ConnectionPool::new_stream`].
pub trait PoolEventListener: Send + Sync {
    fn on_ready(&self, stream: Box<dyn UpstreamStream>, host: HostRef);

    fn on_failure(&self, error: UpstreamError, host: HostRef);
}

/// One logical request stream handed out by a pool.
///
/// Dropping the stream finishes it and releases its slot in the pool.
#[async_trait]
pub trait UpstreamStream: Send + Sync + fmt::Debug {
    fn id(&self) -> u64;

    /// Write request bytes to the upstream.
    async fn send(&self, data: Bytes) -> io::Result<()>;
}

/// Per-host, per-protocol stream multiplexer.
#[async_trait]
pub trait ConnectionPool: Send + Sync + fmt::Debug {
    fn protocol(&self) -> &ProtocolName;

    /// Host the pool currently serves.
    fn host(&self) -> HostRef;

    /// Rebind to a new host identity, keeping live transport where possible.
    fn update_host(&self, host: HostRef);

    fn support_tls(&self) -> bool;

    fn state(&self) -> PoolState;

    /// Make the pool ready to serve, connecting if needed.
    ///
    /// Idempotent. Returns `false` when the pool cannot serve right now; the
    /// pool then stays `Uninitialized` (or wherever shutdown moved it). If
    /// the returned future is dropped mid-way the pool is left `Uninitialized`.
    async fn check_and_init(&self, timeout: Duration) -> bool;

    /// Request a new stream. Never waits; the result arrives via `listener`.
    fn new_stream(&self, receiver: Arc<dyn StreamReceiver>, listener: &dyn PoolEventListener);

    /// Stop accepting streams and close once in-flight streams finish.
    fn shutdown(&self);

    /// Terminate immediately.
    fn close(&self);
}
