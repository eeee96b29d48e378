//! Configuration schema definitions.
//!
//! This module defines the complete daemon configuration structure.
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

/// Root configuration for the daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// Network readiness gate settings.
    pub readiness: ReadinessConfig,

    /// Routing-rule asset provisioning.
    pub assets: AssetsConfig,

    /// Proxy engine (core process) control.
    pub engine: EngineConfig,

    /// Background auto-update settings.
    pub updates: UpdatesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Network readiness gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Hostname resolved to decide that outbound DNS works.
    pub probe_host: String,

    /// Delay between failed probes in seconds.
    pub retry_delay_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            probe_host: "apple.com".to_string(),
            retry_delay_secs: 5,
        }
    }
}

/// A single geo-data asset fetched from a tagged repository.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AssetSpec {
    /// Repository in `owner/name` form.
    pub repo: String,

    /// File name as published upstream.
    pub filename: String,

    /// File name the engine expects locally.
    pub local_name: String,
}

impl AssetSpec {
    pub fn new(repo: &str, filename: &str, local_name: &str) -> Self {
        Self {
            repo: repo.to_string(),
            filename: filename.to_string(),
            local_name: local_name.to_string(),
        }
    }
}

/// Asset provisioning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory the engine loads geo-data from.
    pub asset_dir: String,

    /// Base URL of the tag listing API (`{base}/{repo}/tags`).
    pub tag_api_base: String,

    /// Base URL of the content-delivery mirror (`{base}/{repo}@{tag}/{file}`).
    pub mirror_base: String,

    /// Assets that must exist before the engine can route.
    pub required: Vec<AssetSpec>,

    /// HTTP request timeout in seconds.
    pub http_timeout_secs: u64,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            asset_dir: "/usr/local/share/v2ray".to_string(),
            tag_api_base: "https://api.github.com/repos".to_string(),
            mirror_base: "https://cdn.jsdelivr.net/gh".to_string(),
            required: vec![
                AssetSpec::new("v2rayA/dist-geoip", "geoip.dat", "geoip.dat"),
                AssetSpec::new("v2rayA/dist-domain-list-community", "dlc.dat", "geosite.dat"),
            ],
            http_timeout_secs: 60,
        }
    }
}

/// Proxy engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the core binary.
    pub binary_path: String,

    /// Path of the core configuration file.
    pub config_path: String,

    /// Arguments passed to the core; `{config}` is replaced by `config_path`.
    pub args: Vec<String>,

    /// Script that installs transparent-proxy interception rules.
    pub tproxy_setup_script: Option<String>,

    /// Script that removes transparent-proxy interception rules.
    pub tproxy_teardown_script: Option<String>,

    /// Grace period for the core to exit after a stop request, in seconds.
    pub stop_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: "/usr/local/bin/v2ray".to_string(),
            config_path: "/etc/v2ray/config.json".to_string(),
            args: vec!["run".to_string(), "-c".to_string(), "{config}".to_string()],
            tproxy_setup_script: None,
            tproxy_teardown_script: None,
            stop_timeout_secs: 5,
        }
    }
}

/// Auto-update configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdatesConfig {
    /// Rule-list dataset repository and file names.
    pub rule_list: AssetSpec,

    /// Repository queried for daemon releases.
    pub release_api_url: String,

    /// Maximum subscriptions refreshed at the same time.
    pub subscription_concurrency: usize,

    /// Period of the release check in hours.
    pub version_check_period_hours: u64,

    /// HTTP request timeout in seconds.
    pub http_timeout_secs: u64,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            rule_list: AssetSpec::new(
                "Loyalsoldier/v2ray-rules-dat",
                "geosite.dat",
                "LoyalsoldierSite.dat",
            ),
            release_api_url: "https://api.github.com/repos/v2rayA/v2rayA/releases/latest"
                .to_string(),
            subscription_concurrency: 2,
            version_check_period_hours: 7 * 24,
            http_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
