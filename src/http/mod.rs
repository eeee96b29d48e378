//! Serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing layer)
//!     → handlers.rs (health, version, settings, subscriptions)
//!         → Store / AutoUpdater
//!     → JSON response
//! ```
//!
//! # Design Decisions
//! - The lifecycle controller only sees `ServingSubsystem::run`
//! - Settings writes retime the scheduler immediately

pub mod handlers;
pub mod server;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

pub use server::{ApiState, ManagementServer};

/// Terminal errors of the serving subsystem.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("cannot listen on {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server failed: {0}")]
    Io(std::io::Error),
}

/// A long-running service the lifecycle controller races against signals.
#[async_trait]
pub trait ServingSubsystem: Send {
    /// Serve until `shutdown` fires. `Ok` means a graceful stop.
    async fn run(self: Box<Self>, shutdown: broadcast::Receiver<()>) -> Result<(), ServeError>;
}
