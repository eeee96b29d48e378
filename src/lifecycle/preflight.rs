//! Environment checks run before anything else.

use std::io::Write;
use std::net::{SocketAddr, TcpListener};

use thiserror::Error;

use crate::config::{DaemonConfig, EnvironmentConfig};

/// Conditions that prevent the daemon from starting.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("please run this program as root, or pass --lite / --passcheckroot")]
    NotRoot,

    #[error("invalid listen address {0:?}")]
    BadAddress(String),

    #[error("port {port} is already in use")]
    PortOccupied { port: u16 },

    #[error("cannot check listen address {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
}

/// Whether the process runs with an effective uid of 0.
#[cfg(unix)]
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    true
}

/// Fail when the listen address is already bound by another process.
pub fn check_port(address: &str) -> Result<SocketAddr, PreflightError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|_| PreflightError::BadAddress(address.to_string()))?;
    match TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            Ok(addr)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            Err(PreflightError::PortOccupied { port: addr.port() })
        }
        Err(source) => Err(PreflightError::Bind { address: addr, source }),
    }
}

/// Run the privilege and port checks.
pub fn check_environment(env: &EnvironmentConfig) -> Result<SocketAddr, PreflightError> {
    if env.requires_root() && !is_root() {
        return Err(PreflightError::NotRoot);
    }
    check_port(&env.address)
}

/// Write the environment report printed by `--report`.
pub fn write_report<W: Write>(
    out: &mut W,
    env: &EnvironmentConfig,
    config: &DaemonConfig,
) -> std::io::Result<()> {
    let binary = std::path::Path::new(&config.engine.binary_path);
    writeln!(out, "proxyd {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "os/arch:        {}/{}", std::env::consts::OS, std::env::consts::ARCH)?;
    writeln!(out, "root:           {}", is_root())?;
    writeln!(out, "lite:           {}", env.lite)?;
    writeln!(out, "config dir:     {} (exists: {})", env.config.display(), env.config.exists())?;
    writeln!(out, "listen address: {}", env.address)?;
    writeln!(out, "core binary:    {} (exists: {})", binary.display(), binary.is_file())?;
    writeln!(out, "core config:    {}", config.engine.config_path)?;
    writeln!(out, "asset dir:      {}", config.assets.asset_dir)?;
    for asset in &config.assets.required {
        let path = std::path::Path::new(&config.assets.asset_dir).join(&asset.local_name);
        writeln!(out, "  {:<20} {}", asset.local_name, if path.exists() { "present" } else { "missing" })?;
    }
    for candidate in env.legacy_candidates() {
        if candidate.exists() {
            writeln!(out, "legacy config:  {}", candidate.display())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_occupied_port_is_detected() {
        let holder = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();
        assert!(matches!(
            check_port(&addr.to_string()),
            Err(PreflightError::PortOccupied { port }) if port == addr.port()
        ));

        drop(holder);
        assert_eq!(check_port(&addr.to_string()).unwrap(), addr);
    }

    #[cfg(unix)]
    #[test]
    fn test_root_check_follows_effective_uid() {
        let env = EnvironmentConfig::parse_from(["proxyd", "--address", "127.0.0.1:0"]);
        let root = nix::unistd::geteuid().is_root();
        assert_eq!(is_root(), root);
        match check_environment(&env) {
            Err(PreflightError::NotRoot) => assert!(!root),
            other => assert!(root && other.is_ok()),
        }

        let lite = EnvironmentConfig::parse_from(["proxyd", "--lite", "--address", "127.0.0.1:0"]);
        assert!(check_environment(&lite).is_ok());
    }

    #[test]
    fn test_bad_address() {
        assert!(matches!(check_port("localhost"), Err(PreflightError::BadAddress(_))));
    }

    #[test]
    fn test_report_mentions_paths() {
        let env = EnvironmentConfig::parse_from(["proxyd", "--lite", "--config", "/tmp/proxyd-db"]);
        let mut out = Vec::new();
        write_report(&mut out, &env, &DaemonConfig::default()).unwrap();
        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("lite:           true"));
        assert!(report.contains("/tmp/proxyd-db"));
        assert!(report.contains("geosite.dat"));
    }
}
