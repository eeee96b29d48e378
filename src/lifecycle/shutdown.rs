//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::engine::ProxyEngine;
use crate::store::Store;

/// Stop request sent to the serving subsystem when the race is decided.
///
/// Receivers subscribed before [`Shutdown::trigger`] see exactly one
/// message; later subscribers see nothing.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Ask every subscriber to stop. Returns how many were listening.
    pub fn trigger(&self) -> usize {
        let listening = self.tx.send(()).unwrap_or(0);
        tracing::debug!(listening, "Stop requested");
        listening
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// What one shutdown run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub tproxy_stopped: bool,
    pub engine_stopped: bool,
    pub store_closed: bool,
}

/// The ordered teardown: transparent proxy, engine, store.
///
/// Runs at most once however many times it is invoked. Step failures are
/// logged and never stop the following steps.
pub struct ShutdownSequence {
    engine: Arc<dyn ProxyEngine>,
    store: Store,
    done: AtomicBool,
}

impl ShutdownSequence {
    pub fn new(engine: Arc<dyn ProxyEngine>, store: Store) -> Self {
        Self {
            engine,
            store,
            done: AtomicBool::new(false),
        }
    }

    pub fn has_run(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Run the sequence. Returns `None` if it already ran.
    pub async fn run(&self) -> Option<ShutdownReport> {
        if self.done.swap(true, Ordering::SeqCst) {
            return None;
        }
        tracing::info!("Shutting down");

        let mut report = ShutdownReport::default();
        match self.engine.stop_transparent_proxy().await {
            Ok(()) => report.tproxy_stopped = true,
            Err(e) => tracing::warn!(error = %e, "Failed to stop transparent proxy"),
        }
        match self.engine.stop_process_manager().await {
            Ok(()) => report.engine_stopped = true,
            Err(e) => tracing::warn!(error = %e, "Failed to stop core"),
        }
        match self.store.close() {
            Ok(()) => report.store_closed = true,
            Err(e) => tracing::warn!(error = %e, "Failed to close store"),
        }
        Some(report)
    }
}
