//! Auto-update scheduler subsystem.
//!
//! # Data Flow
//! ```text
//! Setting (store)
//!     → AutoUpdater::apply_settings
//!         → rule-list timer      (period or off) → rule_list loop → RuleListSource
//!         → subscription timer   (period or off) → subscription loop
//!               → refresh_round → run_bounded(limit 2) → SubscriptionSource × N
//!         → immediate runs on start (background, timers untouched)
//!
//! interval(7 days), first tick immediate
//!     → ReleaseSource → ArcSwap<VersionStatus> → management API
//! ```
//!
//! # Design Decisions
//! - Timers and release status are fields of one state struct, not globals
//! - Each loop finishes a refresh before waiting for the next firing
//! - Per-subscription failures are isolated and reported individually
//! - No cooperative cancellation: loops end with the process

pub mod auto_update;
pub mod pool;
pub mod rule_list;
pub mod subscription;
pub mod timer;
pub mod version;

use thiserror::Error;
use tokio::task::JoinError;

use crate::assets::AssetError;
use crate::store::StoreError;

pub use auto_update::{AutoUpdater, ImmediateRuns, UpdateSources, UpdateTicks};
pub use pool::{run_bounded, Outcome};
pub use rule_list::{GithubRuleList, RuleListSource};
pub use subscription::{refresh_round, HttpSubscriptionSource, RoundReport, SubscriptionSource};
pub use timer::{PeriodicTimer, Ticks, OFF_PERIOD};
pub use version::{GithubReleases, ReleaseSource, VersionStatus};

/// Errors raised by a background refresh.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] AssetError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("subscription {0} yielded no usable servers")]
    EmptySubscription(String),

    #[error("refresh task aborted: {0}")]
    Task(#[from] JoinError),
}

pub type UpdateResult<T> = Result<T, UpdateError>;
