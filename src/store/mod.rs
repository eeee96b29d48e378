//! Persistent store subsystem.
//!
//! # Data Flow
//! ```text
//! Store::open(config dir)
//!     → sled database (one tree, JSON values per key)
//!     → handle cloned into migration, scheduler, engine, API
//!
//! Keys:
//!     setting            Setting (presence = configuration exists)
//!     running            bool, engine should be running
//!     servers            Vec<ServerRaw>          (schema v1)
//!     subscriptions      Vec<SubscriptionRaw>    (schema v1)
//!     servers_v2         Vec<ServerRawV2>
//!     subscriptions_v2   Vec<SubscriptionRawV2>
//! ```
//!
//! # Design Decisions
//! - One handle per process, constructed at bootstrap and passed explicitly
//! - Appends are single transactions: a batch lands whole or not at all
//! - Closing is terminal; a closed handle refuses every operation
//! - Concurrency is left to sled; no extra lock around the handle

pub mod lenient;
pub mod model;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use thiserror::Error;

pub use model::{
    AutoUpdateMode, Configure, RulePortMode, ServerRaw, ServerRawV2, Setting, SubscriptionRaw,
    SubscriptionRawV2, SubscriptionStatus, TransparentMode,
};

const TREE: &str = "configure";

mod keys {
    pub const SETTING: &str = "setting";
    pub const RUNNING: &str = "running";
    pub const SERVERS: &str = "servers";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const SERVERS_V2: &str = "servers_v2";
    pub const SUBSCRIPTIONS_V2: &str = "subscriptions_v2";
}

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is closed")]
    Closed,

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("record {key} is corrupt: {source}")]
    Codec {
        key: &'static str,
        source: serde_json::Error,
    },

    #[error("no subscription at index {0}")]
    NoSuchSubscription(usize),

    #[error("cannot prepare store directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the persistent configuration store.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    tree: sled::Tree,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Store {
    /// Open (creating if needed) the store in `dir`.
    ///
    /// A new directory is created restricted to its owner and group; an
    /// existing one is restricted once open.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        if !dir.exists() {
            create_store_dir(dir)?;
        }
        let db = sled::open(dir)?;
        harden_permissions(dir)?;
        tracing::debug!(path = %dir.display(), "Store opened");
        Self::from_db(db)
    }

    /// Open a throwaway in-memory store.
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        let tree = db.open_tree(TREE)?;
        Ok(Self {
            db,
            tree,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Whether no configuration has ever been written.
    pub fn is_configuration_absent(&self) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(!self.tree.contains_key(keys::SETTING)?)
    }

    /// Read the configuration record (settings and v1 lists).
    pub fn configuration(&self) -> StoreResult<Configure> {
        Ok(Configure {
            servers: self.servers()?,
            subscriptions: self.subscriptions()?,
            setting: self.settings()?,
        })
    }

    /// Replace the configuration record in one transaction.
    pub fn set_configuration(&self, configure: &Configure) -> StoreResult<()> {
        self.ensure_open()?;
        let setting = encode(keys::SETTING, &configure.setting)?;
        let servers = encode(keys::SERVERS, &configure.servers)?;
        let subscriptions = encode(keys::SUBSCRIPTIONS, &configure.subscriptions)?;
        let running = encode(keys::RUNNING, &false)?;

        self.tree
            .transaction(|tx| {
                tx.insert(keys::SETTING, setting.clone())?;
                tx.insert(keys::SERVERS, servers.clone())?;
                tx.insert(keys::SUBSCRIPTIONS, subscriptions.clone())?;
                tx.insert(keys::RUNNING, running.clone())?;
                Ok::<_, ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StoreError::Storage(e),
                TransactionError::Abort(()) => StoreError::Closed,
            })?;
        self.tree.flush()?;
        Ok(())
    }

    pub fn settings(&self) -> StoreResult<Setting> {
        self.read(keys::SETTING)
    }

    pub fn set_settings(&self, setting: &Setting) -> StoreResult<()> {
        self.write(keys::SETTING, setting)
    }

    /// Whether the proxy engine should be running.
    pub fn is_running(&self) -> StoreResult<bool> {
        self.read(keys::RUNNING)
    }

    pub fn set_running(&self, running: bool) -> StoreResult<()> {
        self.write(keys::RUNNING, &running)
    }

    pub fn servers(&self) -> StoreResult<Vec<ServerRaw>> {
        self.read(keys::SERVERS)
    }

    pub fn subscriptions(&self) -> StoreResult<Vec<SubscriptionRaw>> {
        self.read(keys::SUBSCRIPTIONS)
    }

    pub fn servers_v2(&self) -> StoreResult<Vec<ServerRawV2>> {
        self.read(keys::SERVERS_V2)
    }

    pub fn subscriptions_v2(&self) -> StoreResult<Vec<SubscriptionRawV2>> {
        self.read(keys::SUBSCRIPTIONS_V2)
    }

    pub fn append_servers(&self, batch: &[ServerRaw]) -> StoreResult<()> {
        self.append(keys::SERVERS, batch)
    }

    pub fn append_subscriptions(&self, batch: &[SubscriptionRaw]) -> StoreResult<()> {
        self.append(keys::SUBSCRIPTIONS, batch)
    }

    pub fn append_servers_v2(&self, batch: &[ServerRawV2]) -> StoreResult<()> {
        self.append(keys::SERVERS_V2, batch)
    }

    pub fn append_subscriptions_v2(&self, batch: &[SubscriptionRawV2]) -> StoreResult<()> {
        self.append(keys::SUBSCRIPTIONS_V2, batch)
    }

    /// Apply `update` to the v2 subscription at `index` atomically.
    pub fn update_subscription_v2<F>(&self, index: usize, update: F) -> StoreResult<SubscriptionRawV2>
    where
        F: Fn(&mut SubscriptionRawV2),
    {
        self.ensure_open()?;
        let result = self.tree.transaction(|tx| {
            let mut list: Vec<SubscriptionRawV2> = match tx.get(keys::SUBSCRIPTIONS_V2)? {
                Some(bytes) => serde_json::from_slice(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(TxAbort::Codec(e)))?,
                None => Vec::new(),
            };
            let entry = list
                .get_mut(index)
                .ok_or(ConflictableTransactionError::Abort(TxAbort::Missing))?;
            update(entry);
            let updated = entry.clone();
            let bytes = serde_json::to_vec(&list)
                .map_err(|e| ConflictableTransactionError::Abort(TxAbort::Codec(e)))?;
            tx.insert(keys::SUBSCRIPTIONS_V2, bytes)?;
            Ok(updated)
        });
        match result {
            Ok(updated) => Ok(updated),
            Err(TransactionError::Storage(e)) => Err(StoreError::Storage(e)),
            Err(TransactionError::Abort(TxAbort::Missing)) => Err(StoreError::NoSuchSubscription(index)),
            Err(TransactionError::Abort(TxAbort::Codec(source))) => Err(StoreError::Codec {
                key: keys::SUBSCRIPTIONS_V2,
                source,
            }),
        }
    }

    /// Flush and close the handle. Later calls are no-ops.
    pub fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.db.flush()?;
        tracing::debug!("Store closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn read<T>(&self, key: &'static str) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        self.ensure_open()?;
        match self.tree.get(key)? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Codec { key, source })
            }
            None => Ok(T::default()),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &'static str, value: &T) -> StoreResult<()> {
        self.ensure_open()?;
        self.tree.insert(key, encode(key, value)?)?;
        self.tree.flush()?;
        Ok(())
    }

    fn append<T>(&self, key: &'static str, batch: &[T]) -> StoreResult<()>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        self.ensure_open()?;
        if batch.is_empty() {
            return Ok(());
        }
        self.tree
            .transaction(|tx| {
                let mut list: Vec<T> = match tx.get(key)? {
                    Some(bytes) => serde_json::from_slice(&bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(TxAbort::Codec(e)))?,
                    None => Vec::new(),
                };
                list.extend_from_slice(batch);
                let bytes = serde_json::to_vec(&list)
                    .map_err(|e| ConflictableTransactionError::Abort(TxAbort::Codec(e)))?;
                tx.insert(key, bytes)?;
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StoreError::Storage(e),
                TransactionError::Abort(TxAbort::Codec(source)) => StoreError::Codec { key, source },
                TransactionError::Abort(TxAbort::Missing) => StoreError::Closed,
            })?;
        self.tree.flush()?;
        Ok(())
    }
}

/// Reasons a store transaction aborts.
#[derive(Debug)]
enum TxAbort {
    Codec(serde_json::Error),
    Missing,
}

fn encode<T: Serialize + ?Sized>(key: &'static str, value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| StoreError::Codec { key, source })
}

/// Create `dir` and its missing parents, restricted from the start.
#[cfg(unix)]
fn create_store_dir(dir: &Path) -> StoreResult<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o750)
        .create(dir)
        .map_err(|source| StoreError::Directory {
            path: dir.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn create_store_dir(dir: &Path) -> StoreResult<()> {
    std::fs::create_dir_all(dir).map_err(|source| StoreError::Directory {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn harden_permissions(dir: &Path) -> StoreResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o750)).map_err(|source| {
        StoreError::Directory {
            path: dir.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn harden_permissions(_dir: &Path) -> StoreResult<()> {
    Ok(())
}
