//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!     → log_sink.rs (buffered lines to a rolling file)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Metrics endpoint (Prometheus scrape)
//!     → Log files on disk
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments) and never fail
//! - The log sink never blocks the request path unless the caller opts in

pub mod log_sink;
pub mod logging;
pub mod metrics;

pub use log_sink::LogSink;
