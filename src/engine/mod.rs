//! Proxy engine control subsystem.
//!
//! # Data Flow
//! ```text
//! lifecycle controller / bootstrap
//!     → ProxyEngine::apply_config           (start core, install tproxy rules)
//!     → ProxyEngine::stop_transparent_proxy (remove tproxy rules)
//!     → ProxyEngine::stop_process_manager   (stop core process)
//!
//! process.rs
//!     → core binary as a child process (tokio::process)
//!     → tproxy setup/teardown as shell scripts
//! ```
//!
//! # Design Decisions
//! - The engine is a trait so bootstrap and shutdown can be tested without a core
//! - Lite mode never touches kernel interception
//! - Stopping is idempotent: stopping a stopped engine succeeds

pub mod process;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::StoreError;

pub use process::CoreProcessManager;

/// Errors raised while controlling the proxy engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot start core {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },

    #[error("script {script:?} failed: {reason}")]
    Script { script: String, reason: String },

    #[error("cannot write core config {path}: {source}")]
    CoreConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot stop core: {0}")]
    Stop(std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Control surface of the proxy engine.
#[async_trait]
pub trait ProxyEngine: Send + Sync {
    /// (Re)start the engine with the current configuration.
    async fn apply_config(&self) -> EngineResult<()>;

    /// Remove transparent-proxy interception.
    async fn stop_transparent_proxy(&self) -> EngineResult<()>;

    /// Stop the engine process.
    async fn stop_process_manager(&self) -> EngineResult<()>;
}
