//! Lifecycle controller: serve, wait for the first terminal event, shut down.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::engine::ProxyEngine;
use crate::http::{ServeError, ServingSubsystem};
use crate::lifecycle::shutdown::{Shutdown, ShutdownSequence};
use crate::store::Store;

/// How long the serving subsystem may take to stop after shutdown begins.
const SERVE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the controller stopped.
#[derive(Debug)]
pub enum ExitReason {
    /// A termination signal arrived first.
    Signal(&'static str),
    /// The serving subsystem stopped on its own without error.
    ServiceStopped,
    /// The serving subsystem failed; the process must exit with an error.
    ServiceFailed(ServeError),
}

impl ExitReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExitReason::ServiceFailed(_))
    }
}

enum Event {
    Served(Result<(), ServeError>),
    Signal(&'static str),
}

/// Drives the foreground phase of the daemon.
pub struct LifecycleController {
    store: Store,
    engine: Arc<dyn ProxyEngine>,
    shutdown: Shutdown,
    sequence: Arc<ShutdownSequence>,
}

impl LifecycleController {
    pub fn new(store: Store, engine: Arc<dyn ProxyEngine>) -> Self {
        let sequence = Arc::new(ShutdownSequence::new(Arc::clone(&engine), store.clone()));
        Self {
            store,
            engine,
            shutdown: Shutdown::new(),
            sequence,
        }
    }

    pub fn sequence(&self) -> Arc<ShutdownSequence> {
        Arc::clone(&self.sequence)
    }

    /// Start the engine if it should be running, serve, and race the
    /// service against `termination`. Whichever finishes first wins; the
    /// shutdown sequence then runs exactly once.
    pub async fn run<T>(self, service: Box<dyn ServingSubsystem>, termination: T) -> ExitReason
    where
        T: Future<Output = &'static str> + Send + 'static,
    {
        self.start_engine().await;

        let (tx, mut rx) = mpsc::channel(2);

        let serve_tx = tx.clone();
        let shutdown_rx = self.shutdown.subscribe();
        let mut serve_task = tokio::spawn(async move {
            let result = service.run(shutdown_rx).await;
            let _ = serve_tx.send(Event::Served(result)).await;
        });
        let signal_task = tokio::spawn(async move {
            let name = termination.await;
            let _ = tx.send(Event::Signal(name)).await;
        });

        let reason = match rx.recv().await {
            Some(Event::Signal(name)) => ExitReason::Signal(name),
            Some(Event::Served(Ok(()))) => ExitReason::ServiceStopped,
            Some(Event::Served(Err(e))) => ExitReason::ServiceFailed(e),
            None => ExitReason::ServiceStopped,
        };
        signal_task.abort();

        self.shutdown.trigger();
        if tokio::time::timeout(SERVE_DRAIN_TIMEOUT, &mut serve_task).await.is_err() {
            tracing::warn!("Serving subsystem did not stop in time");
            serve_task.abort();
        }

        self.sequence.run().await;
        reason
    }

    async fn start_engine(&self) {
        let running = match self.store.is_running() {
            Ok(running) => running,
            Err(e) => {
                tracing::error!(error = %e, "Cannot read engine state");
                false
            }
        };
        if running {
            if let Err(e) = self.engine.apply_config().await {
                tracing::error!(error = %e, "Failed to start the proxy core");
            }
        }
    }
}
