//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → UpstreamConfig (validated, immutable)
//!     → ClusterManager / HealthMonitor / OutlierDetector at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; host changes go through
//!   `ClusterManager::update_hosts`
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ClusterConfig, ConnPoolConfig, HealthCheckConfig, HostConfig, LbPolicy, LogSinkConfig,
    ObservabilityConfig, OutlierDetectionConfig, SubsetFallback, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
