//! Startup orchestration.
//!
//! # Responsibilities
//! - Announce the environment
//! - Open the store and clear stale interception rules
//! - Wait for the network, then migrate the store
//! - Make sure the core has a config and its geo-data
//! - Start the background auto-update scheduler
//!
//! # Design Decisions
//! - Strictly sequential up to the scheduler
//! - Only an unusable store or configuration is fatal
//! - Remote dependencies are injected so the sequence is testable offline

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::alert;
use crate::assets::{AssetFetcher, AssetProvisioner, AssetReport};
use crate::config::{DaemonConfig, EnvironmentConfig};
use crate::engine::{CoreProcessManager, ProxyEngine};
use crate::lifecycle::readiness::{wait_for_network, Resolver};
use crate::migration::{self, MigrationError, MigrationOutcome};
use crate::scheduler::{
    AutoUpdater, GithubReleases, GithubRuleList, HttpSubscriptionSource, UpdateSources,
};
use crate::store::{Store, StoreError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fatal bootstrap failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot open store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Collaborators that reach outside the process.
#[derive(Clone)]
pub struct BootstrapDeps {
    pub resolver: Arc<dyn Resolver>,
    /// Used for geo-data provisioning at startup.
    pub asset_fetcher: Arc<dyn AssetFetcher>,
    /// Used by the background refreshes.
    pub update_fetcher: Arc<dyn AssetFetcher>,
}

/// Everything the foreground phase needs once bootstrap is done.
pub struct Bootstrapped {
    pub store: Store,
    pub engine: Arc<CoreProcessManager>,
    pub updater: Arc<AutoUpdater>,
    pub migration: MigrationOutcome,
    pub assets: Vec<AssetReport>,
    pub update_tasks: Vec<JoinHandle<()>>,
}

/// Log the startup banner.
pub fn hello(env: &EnvironmentConfig, config: &DaemonConfig) {
    let wd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    alert!(path = %config.assets.asset_dir, "asset directory");
    alert!(path = %config.engine.binary_path, "core binary");
    alert!(path = %wd, "working directory");
    alert!(path = %env.config.display(), "configuration directory");
    alert!(os = std::env::consts::OS, arch = std::env::consts::ARCH, "platform");
    alert!(lite = env.lite, version = VERSION, "starting");
}

/// Run the bootstrap sequence.
pub async fn bootstrap(
    env: &EnvironmentConfig,
    config: &DaemonConfig,
    deps: BootstrapDeps,
) -> Result<Bootstrapped, StartupError> {
    hello(env, config);

    let store = Store::open(&env.config)?;
    let engine = Arc::new(CoreProcessManager::new(
        config.engine.clone(),
        &config.assets,
        store.clone(),
        env.lite,
    ));

    if let Err(e) = engine.stop_transparent_proxy().await {
        tracing::warn!(error = %e, "Failed to clear stale transparent proxy rules");
    }

    wait_for_network(
        deps.resolver.as_ref(),
        &config.readiness.probe_host,
        Duration::from_secs(config.readiness.retry_delay_secs),
    )
    .await;

    let migration = migration::run(&store, &env.legacy_candidates())?;
    tracing::info!(outcome = ?migration, "Store is current");

    if let Err(e) = engine.ensure_core_config() {
        tracing::warn!(error = %e, "Cannot create core config");
    }

    let assets = if engine.core_binary_present() {
        AssetProvisioner::new(config.assets.clone(), Arc::clone(&deps.asset_fetcher))
            .provision()
            .await
    } else {
        tracing::warn!(path = %config.engine.binary_path, "Core binary not found, skipping asset check");
        Vec::new()
    };

    let sources = UpdateSources {
        rule_list: Arc::new(GithubRuleList::new(
            Arc::clone(&deps.update_fetcher),
            &config.assets,
            config.updates.rule_list.clone(),
        )),
        subscriptions: Arc::new(HttpSubscriptionSource::new(store.clone(), Arc::clone(&deps.update_fetcher))),
        releases: Arc::new(GithubReleases::new(
            Arc::clone(&deps.update_fetcher),
            config.updates.release_api_url.clone(),
        )),
    };
    let (updater, ticks) = AutoUpdater::new(store.clone(), sources, &config.updates, VERSION);
    let updater = Arc::new(updater);

    let setting = store.settings().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Cannot read settings, auto update uses defaults");
        Default::default()
    });
    let update_tasks = updater.spawn(ticks, &setting);

    Ok(Bootstrapped {
        store,
        engine,
        updater,
        migration,
        assets,
        update_tasks,
    })
}
