//! Subscription refresh.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::assets::AssetFetcher;
use crate::observability::metrics;
use crate::scheduler::pool::run_bounded;
use crate::scheduler::{UpdateError, UpdateResult};
use crate::serverobj::{decode_base64, ServerObj};
use crate::store::{ServerRawV2, Store, StoreResult, SubscriptionStatus};

/// Refreshes one stored subscription.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Refresh the subscription at `index`, returning its server count.
    async fn refresh(&self, index: usize) -> UpdateResult<usize>;
}

/// Fetches the subscription address and replaces its server list.
pub struct HttpSubscriptionSource {
    store: Store,
    fetcher: Arc<dyn AssetFetcher>,
}

impl HttpSubscriptionSource {
    pub fn new(store: Store, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { store, fetcher }
    }

    async fn fetch_servers(&self, address: &str) -> UpdateResult<Vec<ServerRawV2>> {
        let body = self.fetcher.get(address).await?;
        let servers = parse_subscription(&body);
        if servers.is_empty() {
            return Err(UpdateError::EmptySubscription(address.to_string()));
        }
        Ok(servers)
    }
}

#[async_trait]
impl SubscriptionSource for HttpSubscriptionSource {
    async fn refresh(&self, index: usize) -> UpdateResult<usize> {
        let address = self
            .store
            .subscriptions_v2()?
            .get(index)
            .map(|s| s.address.clone())
            .ok_or(UpdateError::Store(crate::store::StoreError::NoSuchSubscription(index)))?;

        match self.fetch_servers(&address).await {
            Ok(servers) => {
                let stamp = chrono::Local::now().to_rfc3339();
                self.store.update_subscription_v2(index, |sub| {
                    sub.servers = servers.clone();
                    sub.status = SubscriptionStatus::Updated(stamp.clone());
                })?;
                Ok(servers.len())
            }
            Err(e) => {
                let reason = e.to_string();
                if let Err(store_err) = self.store.update_subscription_v2(index, |sub| {
                    sub.status = SubscriptionStatus::Failed(reason.clone());
                }) {
                    tracing::debug!(index, error = %store_err, "Cannot record subscription failure");
                }
                Err(e)
            }
        }
    }
}

/// Decode a subscription body into servers.
///
/// Bodies are usually base64 of newline-separated share links; plain
/// link lists are accepted too. Unparseable lines are skipped.
pub fn parse_subscription(body: &[u8]) -> Vec<ServerRawV2> {
    let text = String::from_utf8_lossy(body);
    let decoded = decode_base64(&text)
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| text.into_owned());

    decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match ServerObj::from_link_auto(line) {
            Ok(server_obj) => Some(ServerRawV2 {
                server_obj,
                latency: String::new(),
            }),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping subscription entry");
                None
            }
        })
        .collect()
}

/// Outcome of one refresh round.
#[derive(Debug, Default)]
pub struct RoundReport {
    /// Indices refreshed successfully with their server counts.
    pub updated: Vec<(usize, usize)>,
    /// Indices that failed with the reason.
    pub failed: Vec<(usize, String)>,
}

impl RoundReport {
    pub fn total(&self) -> usize {
        self.updated.len() + self.failed.len()
    }
}

/// Refresh every stored subscription with at most `limit` in flight, and
/// wait for all of them.
pub async fn refresh_round(
    store: &Store,
    source: Arc<dyn SubscriptionSource>,
    limit: usize,
) -> StoreResult<RoundReport> {
    let subscriptions = store.subscriptions_v2()?;
    let start = Instant::now();

    let outcomes = run_bounded(subscriptions.len(), limit, |index| {
        let source = Arc::clone(&source);
        async move { source.refresh(index).await }
    })
    .await;

    let mut report = RoundReport::default();
    for outcome in outcomes {
        let address = subscriptions
            .get(outcome.index)
            .map(|s| s.address.as_str())
            .unwrap_or_default();
        match outcome.result {
            Ok(count) => {
                tracing::info!(id = outcome.index, address, servers = count, "Auto update: subscription updated");
                metrics::record_refresh("subscription", true);
                report.updated.push((outcome.index, count));
            }
            Err(e) => {
                tracing::info!(id = outcome.index, error = %e, "Auto update: failed to update subscription");
                metrics::record_refresh("subscription", false);
                report.failed.push((outcome.index, e.to_string()));
            }
        }
    }
    metrics::record_refresh_round(start);
    Ok(report)
}
