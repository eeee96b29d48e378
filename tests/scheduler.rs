//! Subscription rounds and the auto-update loops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use proxyd::assets::HttpFetcher;
use proxyd::config::UpdatesConfig;
use proxyd::scheduler::{
    refresh_round, AutoUpdater, HttpSubscriptionSource, ReleaseSource, RuleListSource,
    SubscriptionSource, UpdateError, UpdateResult, UpdateSources,
};
use proxyd::store::{AutoUpdateMode, Setting, Store, SubscriptionRawV2, SubscriptionStatus};

mod common;

/// Tracks how many refreshes run at once.
#[derive(Default)]
struct SlowSource {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl SubscriptionSource for SlowSource {
    async fn refresh(&self, index: usize) -> UpdateResult<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if index == 3 {
            return Err(UpdateError::EmptySubscription(format!("sub-{}", index)));
        }
        Ok(index + 1)
    }
}

#[async_trait]
impl RuleListSource for SlowSource {
    async fn check_and_update(&self) -> UpdateResult<String> {
        Ok("20240101".into())
    }
}

#[async_trait]
impl ReleaseSource for SlowSource {
    async fn latest_version(&self) -> UpdateResult<String> {
        Ok("v0.1.0".into())
    }
}

fn subscriptions(count: usize, base: &str) -> Vec<SubscriptionRawV2> {
    (0..count)
        .map(|i| SubscriptionRawV2 {
            remarks: format!("provider {}", i),
            address: format!("{}/sub/{}", base, i),
            ..Default::default()
        })
        .collect()
}

#[tokio::test]
async fn test_round_of_five_runs_two_at_a_time() {
    let store = Store::temporary().unwrap();
    store
        .append_subscriptions_v2(&subscriptions(5, "http://127.0.0.1:1"))
        .unwrap();
    let source = Arc::new(SlowSource::default());

    let report = refresh_round(&store, source.clone(), 2).await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 5);
    assert_eq!(source.peak.load(Ordering::SeqCst), 2);
    assert_eq!(report.total(), 5);
    assert_eq!(report.updated, vec![(0, 1), (1, 2), (2, 3), (4, 5)]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 3);
}

#[tokio::test]
async fn test_http_subscriptions_update_the_store() {
    let body = "trojan://secret@a.example.com:443#node-a\ntrojan://secret@b.example.com:443#node-b\n";
    let backend = common::start_mock_backend(vec![
        ("/sub/0", 200, body.as_bytes().to_vec()),
        ("/sub/1", 500, b"boom".to_vec()),
        ("/sub/2", 200, b"nothing useful here".to_vec()),
    ])
    .await;

    let store = Store::temporary().unwrap();
    store
        .append_subscriptions_v2(&subscriptions(3, &backend.base()))
        .unwrap();
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap());
    let source = Arc::new(HttpSubscriptionSource::new(store.clone(), fetcher));

    let report = refresh_round(&store, source, 2).await.unwrap();
    assert_eq!(report.updated, vec![(0, 2)]);
    assert_eq!(report.failed.len(), 2);

    let stored = store.subscriptions_v2().unwrap();
    assert_eq!(stored[0].servers.len(), 2);
    assert_eq!(stored[0].servers[0].server_obj.name(), "node-a");
    assert!(matches!(stored[0].status, SubscriptionStatus::Updated(_)));
    assert!(matches!(stored[1].status, SubscriptionStatus::Failed(_)));
    assert!(stored[1].servers.is_empty());
    assert!(matches!(stored[2].status, SubscriptionStatus::Failed(_)));

    let mut hits = backend.hits();
    hits.sort();
    assert_eq!(hits, vec!["/sub/0", "/sub/1", "/sub/2"]);
}

#[tokio::test]
async fn test_every_start_refreshes_in_background() {
    let store = Store::temporary().unwrap();
    store
        .append_subscriptions_v2(&subscriptions(3, "http://127.0.0.1:1"))
        .unwrap();
    let source = Arc::new(SlowSource::default());
    let sources = UpdateSources {
        rule_list: source.clone(),
        subscriptions: source.clone(),
        releases: source.clone(),
    };
    let (updater, ticks) = AutoUpdater::new(store, sources, &UpdatesConfig::default(), "0.1.0");
    let updater = Arc::new(updater);

    let setting = Setting {
        subscription_auto_update_mode: AutoUpdateMode::AutoUpdateOnEveryStart,
        ..Default::default()
    };
    let tasks = updater.spawn(ticks, &setting);

    tokio::time::timeout(Duration::from_secs(5), async {
        while source.calls.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("immediate round finishes");

    // the immediate run leaves the timer alone
    assert!(updater.subscription_timer().is_off());
    assert_eq!(updater.subscription_timer().resets(), 0);

    for task in tasks {
        task.abort();
    }
}

#[tokio::test(start_paused = true)]
async fn test_interval_setting_drives_the_timer() {
    let store = Store::temporary().unwrap();
    store
        .append_subscriptions_v2(&subscriptions(1, "http://127.0.0.1:1"))
        .unwrap();
    let source = Arc::new(SlowSource::default());
    let sources = UpdateSources {
        rule_list: source.clone(),
        subscriptions: source.clone(),
        releases: source.clone(),
    };
    let (updater, ticks) = AutoUpdater::new(store, sources, &UpdatesConfig::default(), "0.1.0");
    let updater = Arc::new(updater);

    let setting = Setting {
        subscription_auto_update_mode: AutoUpdateMode::AutoUpdateAtFixedIntervalHours,
        subscription_auto_update_interval_hour: 1,
        ..Default::default()
    };
    let tasks = updater.spawn(ticks, &setting);
    assert_eq!(updater.subscription_timer().period(), Duration::from_secs(3600));

    // immediate run, then one more per hour
    tokio::time::sleep(Duration::from_secs(60)).await;
    let after_start = source.calls.load(Ordering::SeqCst);
    assert_eq!(after_start, 1);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);

    for task in tasks {
        task.abort();
    }
}
