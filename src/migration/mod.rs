//! Configuration migration pipeline.
//!
//! # Data Flow
//! ```text
//! store has no configuration?
//!     yes → first existing legacy JSON candidate that decodes and validates
//!             → written as the configuration        (MigratedFromLegacy)
//!           no candidate succeeded
//!             → default configuration written       (Defaulted, write failure is fatal)
//!
//! v1 lists non-empty AND v2 lists empty?
//!     yes → schema_v2::upgrade                      (UpgradedToV2)
//!     no  → nothing to do                           (Current)
//! ```
//!
//! # Design Decisions
//! - A bad legacy file is logged and the next candidate is tried
//! - A store imported from legacy JSON is upgraded in the same run
//! - Running against a current store performs no writes

pub mod legacy;
pub mod schema_v2;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::observability::metrics;
use crate::store::{Configure, Store, StoreError};

pub use schema_v2::UpgradeReport;

/// Errors that stop the migration pipeline.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("store unavailable during migration: {0}")]
    Store(#[from] StoreError),

    #[error("failed to write the default configuration: {0}")]
    DefaultWrite(#[source] StoreError),
}

/// Terminal state reached by one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Imported from a legacy JSON file, then upgraded if it carried v1 lists.
    MigratedFromLegacy {
        source: PathBuf,
        upgrade: Option<UpgradeReport>,
    },
    Defaulted,
    UpgradedToV2(UpgradeReport),
    Current,
}

impl MigrationOutcome {
    fn label(&self) -> &'static str {
        match self {
            MigrationOutcome::MigratedFromLegacy { .. } => "legacy",
            MigrationOutcome::Defaulted => "defaulted",
            MigrationOutcome::UpgradedToV2(_) => "upgraded",
            MigrationOutcome::Current => "current",
        }
    }
}

/// Bring `store` to the current schema.
pub fn run(store: &Store, candidates: &[PathBuf]) -> Result<MigrationOutcome, MigrationError> {
    let outcome = if store.is_configuration_absent()? {
        match import_legacy(store, candidates) {
            Some(source) => MigrationOutcome::MigratedFromLegacy {
                source,
                upgrade: upgrade_if_needed(store)?,
            },
            None => {
                store
                    .set_configuration(&Configure::default())
                    .map_err(MigrationError::DefaultWrite)?;
                tracing::info!("Initialized default configuration");
                MigrationOutcome::Defaulted
            }
        }
    } else {
        match upgrade_if_needed(store)? {
            Some(report) => MigrationOutcome::UpgradedToV2(report),
            None => MigrationOutcome::Current,
        }
    };

    metrics::record_migration(outcome.label());
    Ok(outcome)
}

/// Import the first legacy candidate that exists and is valid.
fn import_legacy(store: &Store, candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .filter(|path| path.exists())
        .find(|path| match try_import(store, path) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Legacy config migration failed");
                false
            }
        })
        .cloned()
}

fn try_import(store: &Store, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(path = %path.display(), "Migrating legacy JSON config");
    let configure = legacy::read_legacy(path)?;
    store.set_configuration(&configure)?;
    Ok(())
}

/// Whether the store holds v1 entries that have no v2 counterpart yet.
pub fn needs_upgrade(store: &Store) -> Result<bool, StoreError> {
    let v1 = store.servers()?.len() + store.subscriptions()?.len();
    let v2 = store.servers_v2()?.len() + store.subscriptions_v2()?.len();
    Ok(v1 > 0 && v2 == 0)
}

fn upgrade_if_needed(store: &Store) -> Result<Option<UpgradeReport>, StoreError> {
    if !needs_upgrade(store)? {
        return Ok(None);
    }
    tracing::info!("Migrating server format from v1 to v2");
    let report = schema_v2::upgrade(store)?;
    tracing::info!(
        servers = report.servers_migrated,
        servers_skipped = report.servers_skipped,
        subscriptions = report.subscriptions_migrated,
        subscription_servers_skipped = report.subscription_servers_skipped,
        "Server format migration complete"
    );
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ServerRaw, ServerRawV2};
    use crate::serverobj::{ServerObj, VmessInfo};

    #[test]
    fn test_defaults_without_candidates() {
        let store = Store::temporary().unwrap();
        let outcome = run(&store, &[PathBuf::from("/nonexistent/v2raya.json")]).unwrap();
        assert_eq!(outcome, MigrationOutcome::Defaulted);
        assert!(!store.is_configuration_absent().unwrap());
        assert_eq!(store.configuration().unwrap(), Configure::default());
    }

    #[test]
    fn test_current_store_is_left_alone() {
        let store = Store::temporary().unwrap();
        store.set_configuration(&Configure::default()).unwrap();
        assert_eq!(run(&store, &[]).unwrap(), MigrationOutcome::Current);
    }

    #[test]
    fn test_existing_v2_blocks_upgrade() {
        let store = Store::temporary().unwrap();
        store.set_configuration(&Configure::default()).unwrap();
        store
            .append_servers(&[ServerRaw {
                vmess_info: VmessInfo {
                    ps: "old".into(),
                    add: "a.example.com".into(),
                    port: "443".into(),
                    id: "u".into(),
                    ..Default::default()
                },
                latency: String::new(),
            }])
            .unwrap();
        store
            .append_servers_v2(&[ServerRawV2 {
                server_obj: ServerObj::from_link_auto("trojan://p@b.example.com:443#new").unwrap(),
                latency: String::new(),
            }])
            .unwrap();

        assert!(!needs_upgrade(&store).unwrap());
        assert_eq!(run(&store, &[]).unwrap(), MigrationOutcome::Current);
        assert_eq!(store.servers_v2().unwrap().len(), 1);
    }
}
