//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line (environment.rs)
//!     → store directory, listen address, lite mode
//!
//! daemon config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DaemonConfig (validated, immutable)
//!     → handed by reference to each bootstrap stage
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Runtime-mutable settings live in the store, not here

pub mod environment;
pub mod loader;
pub mod schema;
pub mod validation;

pub use environment::EnvironmentConfig;
pub use schema::DaemonConfig;
pub use schema::{AssetSpec, AssetsConfig, EngineConfig, ObservabilityConfig, ReadinessConfig, UpdatesConfig};
