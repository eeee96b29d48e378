//! Persisted record shapes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serverobj::{ServerObj, VmessInfo};
use crate::store::lenient;

/// The monolithic configuration record, as found in legacy JSON files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configure {
    pub servers: Vec<ServerRaw>,
    pub subscriptions: Vec<SubscriptionRaw>,
    pub setting: Setting,
}

/// Schema v1 server entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerRaw {
    pub vmess_info: VmessInfo,
    #[serde(deserialize_with = "lenient::as_string")]
    pub latency: String,
}

/// Schema v1 subscription entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionRaw {
    pub remarks: String,
    pub address: String,
    pub status: String,
    pub servers: Vec<ServerRaw>,
    pub info: String,
}

/// Schema v2 server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRawV2 {
    pub server_obj: ServerObj,
    #[serde(default)]
    pub latency: String,
}

/// Refresh state of a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Never refreshed by this daemon.
    #[default]
    Pending,
    /// Last refresh succeeded at the given time.
    Updated(String),
    /// Last refresh failed with the given reason.
    Failed(String),
}

impl SubscriptionStatus {
    /// Interpret a v1 free-form status; v1 stored the last update time.
    pub fn from_legacy(status: &str) -> Self {
        if status.trim().is_empty() {
            SubscriptionStatus::Pending
        } else {
            SubscriptionStatus::Updated(status.to_string())
        }
    }
}

/// Schema v2 subscription entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionRawV2 {
    pub remarks: String,
    pub address: String,
    pub status: SubscriptionStatus,
    pub servers: Vec<ServerRawV2>,
    pub info: String,
}

/// How a background refresh subject is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoUpdateMode {
    #[default]
    #[serde(rename = "none")]
    Disabled,
    #[serde(rename = "auto_update")]
    AutoUpdateOnEveryStart,
    #[serde(rename = "auto_update_at_intervals")]
    AutoUpdateAtFixedIntervalHours,
}

/// Which traffic the transparent proxy intercepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransparentMode {
    #[default]
    Close,
    Proxy,
    Whitelist,
    Gfwlist,
    Pac,
}

/// Routing rule set used by the rule port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePortMode {
    #[default]
    Whitelist,
    Gfwlist,
    Custom,
}

/// Process-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Setting {
    #[serde(alias = "pacAutoUpdateMode", alias = "gfwlistAutoUpdateMode")]
    pub rule_list_auto_update_mode: AutoUpdateMode,
    #[serde(
        alias = "pacAutoUpdateIntervalHour",
        alias = "gfwlistAutoUpdateIntervalHour",
        deserialize_with = "lenient::as_u64"
    )]
    pub rule_list_auto_update_interval_hour: u64,
    pub subscription_auto_update_mode: AutoUpdateMode,
    #[serde(deserialize_with = "lenient::as_u64")]
    pub subscription_auto_update_interval_hour: u64,
    pub transparent: TransparentMode,
    #[serde(alias = "pacMode")]
    pub rule_port_mode: RulePortMode,
}

impl Setting {
    /// Refresh period of the rule list, when it runs at fixed intervals.
    pub fn rule_list_period(&self) -> Option<Duration> {
        fixed_period(self.rule_list_auto_update_mode, self.rule_list_auto_update_interval_hour)
    }

    /// Refresh period of subscriptions, when they run at fixed intervals.
    pub fn subscription_period(&self) -> Option<Duration> {
        fixed_period(
            self.subscription_auto_update_mode,
            self.subscription_auto_update_interval_hour,
        )
    }

    /// Reject fixed-interval modes without a usable interval.
    pub fn check_intervals(&self) -> Result<(), String> {
        let intervals = [
            ("rule list", self.rule_list_auto_update_mode, self.rule_list_auto_update_interval_hour),
            (
                "subscription",
                self.subscription_auto_update_mode,
                self.subscription_auto_update_interval_hour,
            ),
        ];
        for (subject, mode, hours) in intervals {
            if mode == AutoUpdateMode::AutoUpdateAtFixedIntervalHours && hours == 0 {
                return Err(format!("{} auto update interval must be at least one hour", subject));
            }
        }
        Ok(())
    }
}

fn fixed_period(mode: AutoUpdateMode, hours: u64) -> Option<Duration> {
    match mode {
        AutoUpdateMode::AutoUpdateAtFixedIntervalHours if hours > 0 => {
            Some(Duration::from_secs(hours.saturating_mul(3600)))
        }
        _ => None,
    }
}
