//! Proxy management daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   preflight ──▶ bootstrap ───────────────────────────────────────────────┐
//!                 │ open store ─▶ clear tproxy ─▶ readiness gate            │
//!                 │ migration (legacy JSON / default / v1 → v2)             │
//!                 │ core config ─▶ geo-data assets                          │
//!                 └ auto-update scheduler (background) ──┐                  │
//!                                                        ▼                  ▼
//!   lifecycle controller:  management API  ◀──race──▶  signals ─▶ shutdown sequence
//! ```

use std::error::Error;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use proxyd::assets::HttpFetcher;
use proxyd::config::loader::load_config;
use proxyd::config::{DaemonConfig, EnvironmentConfig};
use proxyd::http::{ApiState, ManagementServer};
use proxyd::lifecycle::preflight::{check_environment, write_report};
use proxyd::lifecycle::readiness::SystemResolver;
use proxyd::lifecycle::{bootstrap, signals, BootstrapDeps, ExitReason, LifecycleController};
use proxyd::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let env = EnvironmentConfig::parse();

    let mut config = match &env.daemon_config {
        Some(path) => load_config(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(level) = &env.log_level {
        config.observability.log_level = level.clone();
    }
    if env.log_json {
        config.observability.json = true;
    }

    if env.report {
        write_report(&mut std::io::stdout().lock(), &env, &config)?;
        return Ok(());
    }

    observability::logging::init(&config.observability)?;

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listen = check_environment(&env).unwrap_or_else(|e| fatal(e));

    let deps = BootstrapDeps {
        resolver: Arc::new(SystemResolver),
        asset_fetcher: Arc::new(HttpFetcher::new(Duration::from_secs(config.assets.http_timeout_secs))?),
        update_fetcher: Arc::new(HttpFetcher::new(Duration::from_secs(config.updates.http_timeout_secs))?),
    };
    let booted = bootstrap(&env, &config, deps).await.unwrap_or_else(|e| fatal(e));

    let state = ApiState {
        store: booted.store.clone(),
        updater: Arc::clone(&booted.updater),
    };
    let server = ManagementServer::bind(&listen.to_string(), state)
        .await
        .unwrap_or_else(|e| fatal(e));

    let controller = LifecycleController::new(booted.store.clone(), booted.engine.clone());
    match controller.run(Box::new(server), signals::termination()).await {
        ExitReason::ServiceFailed(e) => fatal(e),
        reason => tracing::info!(reason = ?reason, "Shutdown complete"),
    }
    Ok(())
}

/// Log a fatal error and exit with status 1.
fn fatal(error: impl Display) -> ! {
    tracing::error!(error = %error, "Fatal");
    std::process::exit(1)
}
