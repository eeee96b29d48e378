//! Auto-update scheduler state.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::UpdatesConfig;
use crate::observability::metrics;
use crate::scheduler::rule_list::RuleListSource;
use crate::scheduler::subscription::{refresh_round, RoundReport, SubscriptionSource};
use crate::scheduler::timer::{PeriodicTimer, Ticks};
use crate::scheduler::version::{is_newer, ReleaseSource, VersionStatus};
use crate::store::{AutoUpdateMode, RulePortMode, Setting, Store, TransparentMode};

/// Remote sources the scheduler refreshes from.
#[derive(Clone)]
pub struct UpdateSources {
    pub rule_list: Arc<dyn RuleListSource>,
    pub subscriptions: Arc<dyn SubscriptionSource>,
    pub releases: Arc<dyn ReleaseSource>,
}

/// Firing ends of the two refresh timers.
#[derive(Debug)]
pub struct UpdateTicks {
    pub rule_list: Ticks,
    pub subscriptions: Ticks,
}

/// Refreshes a settings change asks to run right away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImmediateRuns {
    pub rule_list: bool,
    pub subscriptions: bool,
}

/// Owns the refresh timers and the release status for the process lifetime.
pub struct AutoUpdater {
    store: Store,
    sources: UpdateSources,
    rule_list_timer: PeriodicTimer,
    subscription_timer: PeriodicTimer,
    version: ArcSwap<VersionStatus>,
    current_version: String,
    concurrency: usize,
    version_period: Duration,
}

impl AutoUpdater {
    /// Create the scheduler with both timers switched off.
    pub fn new(
        store: Store,
        sources: UpdateSources,
        config: &UpdatesConfig,
        current_version: impl Into<String>,
    ) -> (Self, UpdateTicks) {
        let (rule_list_timer, rule_list) = PeriodicTimer::new("rule_list");
        let (subscription_timer, subscriptions) = PeriodicTimer::new("subscriptions");
        let updater = Self {
            store,
            sources,
            rule_list_timer,
            subscription_timer,
            version: ArcSwap::from_pointee(VersionStatus::default()),
            current_version: current_version.into(),
            concurrency: config.subscription_concurrency,
            version_period: Duration::from_secs(config.version_check_period_hours.max(1).saturating_mul(3600)),
        };
        (
            updater,
            UpdateTicks {
                rule_list,
                subscriptions,
            },
        )
    }

    pub fn rule_list_timer(&self) -> &PeriodicTimer {
        &self.rule_list_timer
    }

    pub fn subscription_timer(&self) -> &PeriodicTimer {
        &self.subscription_timer
    }

    pub fn version_status(&self) -> Arc<VersionStatus> {
        self.version.load_full()
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Reconfigure both timers from `setting`.
    ///
    /// A timer is only reset when its period actually changes. The
    /// returned flags say which refreshes should run once right away.
    pub fn apply_settings(&self, setting: &Setting) -> ImmediateRuns {
        sync_timer(&self.rule_list_timer, setting.rule_list_period());
        sync_timer(&self.subscription_timer, setting.subscription_period());

        let rule_list_wanted = runs_on_start(setting.rule_list_auto_update_mode)
            || setting.transparent == TransparentMode::Gfwlist;
        ImmediateRuns {
            rule_list: rule_list_wanted && setting.rule_port_mode == RulePortMode::Gfwlist,
            subscriptions: runs_on_start(setting.subscription_auto_update_mode),
        }
    }

    /// Refresh the rule-list dataset once.
    pub async fn refresh_rule_list(&self) {
        match self.sources.rule_list.check_and_update().await {
            Ok(version) => {
                tracing::info!(version = %version, "Auto update: rule list is up to date");
                metrics::record_refresh("rule_list", true);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Auto update: failed to update rule list");
                metrics::record_refresh("rule_list", false);
            }
        }
    }

    /// Run one bounded refresh round over all subscriptions.
    pub async fn refresh_subscriptions(&self) -> Option<RoundReport> {
        match refresh_round(&self.store, Arc::clone(&self.sources.subscriptions), self.concurrency).await {
            Ok(report) => {
                tracing::info!(
                    updated = report.updated.len(),
                    failed = report.failed.len(),
                    "Auto update: subscription round complete"
                );
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Auto update: cannot list subscriptions");
                None
            }
        }
    }

    /// Query the latest release. The status is left unchanged on failure.
    pub async fn check_version(&self) {
        match self.sources.releases.latest_version().await {
            Ok(remote) => {
                let status = VersionStatus {
                    found_new: is_newer(&remote, &self.current_version),
                    remote_version: remote,
                };
                if status.found_new {
                    tracing::info!(remote = %status.remote_version, "A newer release is available");
                }
                self.version.store(Arc::new(status));
                metrics::record_refresh("version", true);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Release check failed");
                metrics::record_refresh("version", false);
            }
        }
    }

    /// Start the refresh loops and the startup refreshes.
    ///
    /// The loops run for the process lifetime.
    pub fn spawn(self: &Arc<Self>, ticks: UpdateTicks, setting: &Setting) -> Vec<JoinHandle<()>> {
        let runs = self.apply_settings(setting);
        let UpdateTicks {
            mut rule_list,
            mut subscriptions,
        } = ticks;

        let mut handles = Vec::with_capacity(5);

        let updater = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            while rule_list.tick().await {
                updater.refresh_rule_list().await;
            }
        }));

        let updater = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            while subscriptions.tick().await {
                updater.refresh_subscriptions().await;
            }
        }));

        if runs.rule_list {
            let updater = Arc::clone(self);
            handles.push(tokio::spawn(async move { updater.refresh_rule_list().await }));
        }
        if runs.subscriptions {
            let updater = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                updater.refresh_subscriptions().await;
            }));
        }

        let updater = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(updater.version_period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately: check, then wait.
                interval.tick().await;
                updater.check_version().await;
            }
        }));

        handles
    }
}

fn runs_on_start(mode: AutoUpdateMode) -> bool {
    matches!(
        mode,
        AutoUpdateMode::AutoUpdateOnEveryStart | AutoUpdateMode::AutoUpdateAtFixedIntervalHours
    )
}

fn sync_timer(timer: &PeriodicTimer, period: Option<Duration>) {
    match period {
        Some(period) if period != timer.period() => timer.reset(period),
        Some(_) => {}
        None if !timer.is_off() => timer.turn_off(),
        None => {}
    }
}
