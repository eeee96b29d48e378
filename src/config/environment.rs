//! Process environment: command-line flags and the paths derived from them.

use std::path::{Path, PathBuf};

use clap::Parser;

/// Command-line options of the daemon.
#[derive(Debug, Clone, Parser)]
#[command(name = "proxyd", version, about = "Proxy management daemon")]
pub struct EnvironmentConfig {
    /// Directory holding the persistent store.
    #[arg(short, long, env = "PROXYD_CONFIG", default_value = "/etc/proxyd")]
    pub config: PathBuf,

    /// Listen address of the management API.
    #[arg(short, long, env = "PROXYD_ADDRESS", default_value = "127.0.0.1:2017")]
    pub address: String,

    /// Optional daemon configuration file (TOML).
    #[arg(long, env = "PROXYD_DAEMON_CONFIG")]
    pub daemon_config: Option<PathBuf>,

    /// Run without root: no privilege check and no transparent proxy.
    #[arg(long, env = "PROXYD_LITE")]
    pub lite: bool,

    /// Skip the root privilege check.
    #[arg(long, env = "PROXYD_PASS_CHECK_ROOT")]
    pub passcheckroot: bool,

    /// Print an environment report and exit.
    #[arg(long)]
    pub report: bool,

    /// Override the configured log level.
    #[arg(long, env = "PROXYD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "PROXYD_LOG_JSON")]
    pub log_json: bool,
}

impl EnvironmentConfig {
    /// Legacy JSON configuration files, in the order they are tried.
    pub fn legacy_candidates(&self) -> Vec<PathBuf> {
        let parent = self.config.parent().unwrap_or_else(|| Path::new("/"));
        vec![
            parent.join("v2raya.json"),
            PathBuf::from("/etc/v2ray/v2raya.json"),
            PathBuf::from("/etc/v2raya/v2raya.json"),
        ]
    }

    /// Whether the privilege check applies to this run.
    pub fn requires_root(&self) -> bool {
        !self.lite && !self.passcheckroot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_candidates() {
        let env = EnvironmentConfig::parse_from(["proxyd", "--config", "/var/lib/proxyd/db"]);
        assert_eq!(env.address, "127.0.0.1:2017");
        assert!(env.requires_root());
        assert_eq!(
            env.legacy_candidates(),
            vec![
                PathBuf::from("/var/lib/proxyd/v2raya.json"),
                PathBuf::from("/etc/v2ray/v2raya.json"),
                PathBuf::from("/etc/v2raya/v2raya.json"),
            ]
        );
    }

    #[test]
    fn test_lite_skips_root() {
        let env = EnvironmentConfig::parse_from(["proxyd", "--lite"]);
        assert!(!env.requires_root());
    }
}
