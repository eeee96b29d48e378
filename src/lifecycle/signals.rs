//! OS signal handling.
//!
//! # Design Decisions
//! - INT, TERM, HUP and QUIT all mean "begin graceful shutdown"
//! - KILL cannot be caught and ILL keeps its default action
//! - A handler that cannot be installed is logged and skipped

/// Wait for the first termination-class signal. Returns its name.
#[cfg(unix)]
pub async fn termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let kinds = [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::hangup(), "SIGHUP"),
        (SignalKind::quit(), "SIGQUIT"),
    ];

    let mut waiters = tokio::task::JoinSet::new();
    for (kind, name) in kinds {
        match signal(kind) {
            Ok(mut stream) => {
                waiters.spawn(async move {
                    stream.recv().await;
                    name
                });
            }
            Err(e) => tracing::warn!(signal = name, error = %e, "Cannot install signal handler"),
        }
    }

    match waiters.join_next().await {
        Some(Ok(name)) => {
            tracing::info!(signal = name, "Termination signal received");
            name
        }
        _ => std::future::pending().await,
    }
}

#[cfg(not(unix))]
pub async fn termination() -> &'static str {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    "ctrl-c"
}
