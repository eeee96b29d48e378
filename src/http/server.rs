//! Management API server.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up tracing middleware
//! - Serve until the shutdown broadcast fires

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::http::handlers::{get_health, get_settings, get_subscriptions, get_version, put_settings};
use crate::http::{ServeError, ServingSubsystem};
use crate::scheduler::AutoUpdater;
use crate::store::Store;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub updater: Arc<AutoUpdater>,
}

/// HTTP server for the management API.
pub struct ManagementServer {
    listener: TcpListener,
    router: Router,
}

impl ManagementServer {
    /// Bind the listen address.
    pub async fn bind(address: &str, state: ApiState) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServeError::Bind {
                address: address.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            router: Self::build_router(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        self.listener.local_addr().map_err(ServeError::Io)
    }

    fn build_router(state: ApiState) -> Router {
        Router::new()
            .route("/api/health", get(get_health))
            .route("/api/version", get(get_version))
            .route("/api/settings", get(get_settings).put(put_settings))
            .route("/api/subscriptions", get(get_subscriptions))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait]
impl ServingSubsystem for ManagementServer {
    async fn run(self: Box<Self>, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServeError> {
        let addr = self.local_addr()?;
        tracing::info!(address = %addr, "Management API listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await
            .map_err(ServeError::Io)?;

        tracing::info!("Management API stopped");
        Ok(())
    }
}
