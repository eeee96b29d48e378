//! Schema v1 → v2 upgrade.
//!
//! Every v1 server is exported to a share link under its protocol tag and
//! parsed back into a polymorphic server object. Entries that do not
//! survive the round trip are skipped and logged by name.

use crate::observability::metrics;
use crate::serverobj::legacy::LEGACY_PROTOCOL;
use crate::serverobj::{ServerObj, ServerObjResult};
use crate::store::{
    ServerRaw, ServerRawV2, Store, StoreResult, SubscriptionRaw, SubscriptionRawV2,
    SubscriptionStatus,
};

/// Counts produced by one upgrade run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    pub servers_migrated: usize,
    pub servers_skipped: usize,
    pub subscriptions_migrated: usize,
    /// Nested subscription servers that failed reconstruction.
    pub subscription_servers_skipped: usize,
}

/// Reconstruct one v1 server as a v2 server.
pub fn convert_server(raw: &ServerRaw) -> ServerObjResult<ServerRawV2> {
    let mut info = raw.vmess_info.clone();
    if info.protocol.is_empty() {
        info.protocol = LEGACY_PROTOCOL.to_string();
    }
    let server_obj = ServerObj::from_link(&info.protocol, &info.export_to_url())?;
    Ok(ServerRawV2 {
        server_obj,
        latency: raw.latency.clone(),
    })
}

/// Convert a server list, returning the survivors and the skip count.
pub fn convert_servers(raws: &[ServerRaw]) -> (Vec<ServerRawV2>, usize) {
    let mut converted = Vec::with_capacity(raws.len());
    let mut skipped = 0;
    for raw in raws {
        match convert_server(raw) {
            Ok(server) => converted.push(server),
            Err(e) => {
                skipped += 1;
                tracing::warn!(server = %raw.vmess_info.ps, error = %e, "failed to migrate server");
            }
        }
    }
    (converted, skipped)
}

/// Convert subscriptions. A subscription is kept even when some of its
/// servers are skipped.
pub fn convert_subscriptions(raws: &[SubscriptionRaw]) -> (Vec<SubscriptionRawV2>, usize) {
    let mut skipped = 0;
    let converted = raws
        .iter()
        .map(|raw| {
            let (servers, lost) = convert_servers(&raw.servers);
            skipped += lost;
            SubscriptionRawV2 {
                remarks: raw.remarks.clone(),
                address: raw.address.clone(),
                status: SubscriptionStatus::from_legacy(&raw.status),
                servers,
                info: raw.info.clone(),
            }
        })
        .collect();
    (converted, skipped)
}

/// Upgrade the v1 lists in `store` and append the results to the v2 lists.
///
/// Append failures are logged and leave the corresponding v2 list untouched.
pub fn upgrade(store: &Store) -> StoreResult<UpgradeReport> {
    let mut report = UpgradeReport::default();

    let (servers, skipped) = convert_servers(&store.servers()?);
    report.servers_skipped = skipped;
    if !servers.is_empty() {
        match store.append_servers_v2(&servers) {
            Ok(()) => report.servers_migrated = servers.len(),
            Err(e) => tracing::warn!(error = %e, "failed to migrate servers"),
        }
    }

    let (subscriptions, skipped) = convert_subscriptions(&store.subscriptions()?);
    report.subscription_servers_skipped = skipped;
    let mut nested_migrated = 0;
    if !subscriptions.is_empty() {
        match store.append_subscriptions_v2(&subscriptions) {
            Ok(()) => {
                report.subscriptions_migrated = subscriptions.len();
                nested_migrated = subscriptions.iter().map(|s| s.servers.len()).sum();
            }
            Err(e) => tracing::warn!(error = %e, "failed to migrate subscriptions"),
        }
    }

    metrics::record_migrated_entries("server", report.servers_migrated, report.servers_skipped);
    metrics::record_migrated_entries(
        "subscription_server",
        nested_migrated,
        report.subscription_servers_skipped,
    );
    Ok(report)
}
