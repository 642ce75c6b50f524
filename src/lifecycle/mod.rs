//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     ctrl-c → trigger → health monitor and outlier detector exit
//!     → pools closed → log sink flushed → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop checkers, close pools, flush logs

pub mod shutdown;

pub use shutdown::Shutdown;
