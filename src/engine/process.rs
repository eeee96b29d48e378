//! Core process management.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::{AssetsConfig, EngineConfig};
use crate::engine::{EngineError, EngineResult, ProxyEngine};
use crate::store::{Store, TransparentMode};

/// Runs the proxy core as a child process.
pub struct CoreProcessManager {
    config: EngineConfig,
    asset_dir: String,
    store: Store,
    lite: bool,
    child: Mutex<Option<Child>>,
    tproxy_active: AtomicBool,
}

impl CoreProcessManager {
    pub fn new(config: EngineConfig, assets: &AssetsConfig, store: Store, lite: bool) -> Self {
        Self {
            config,
            asset_dir: assets.asset_dir.clone(),
            store,
            lite,
            child: Mutex::new(None),
            tproxy_active: AtomicBool::new(false),
        }
    }

    pub fn binary_path(&self) -> &Path {
        Path::new(&self.config.binary_path)
    }

    pub fn config_path(&self) -> &Path {
        Path::new(&self.config.config_path)
    }

    /// Whether the core binary is installed.
    pub fn core_binary_present(&self) -> bool {
        self.binary_path().is_file()
    }

    /// Write a minimal core config if none exists. Returns whether one was written.
    pub fn ensure_core_config(&self) -> EngineResult<bool> {
        let path = self.config_path();
        if path.exists() {
            return Ok(false);
        }
        let err = |source| EngineError::CoreConfig {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(err)?;
        }
        let template = serde_json::to_vec_pretty(&core_config_template())
            .map_err(|e| err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        std::fs::write(path, template).map_err(err)?;
        tracing::info!(path = %path.display(), "Created core config from template");
        Ok(true)
    }

    pub async fn is_core_running(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(_) => {
                *child = None;
                false
            }
            None => false,
        }
    }

    fn core_args(&self) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| arg.replace("{config}", &self.config.config_path))
            .collect()
    }

    async fn stop_child(&self) -> EngineResult<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }

        terminate(&child);
        let grace = Duration::from_secs(self.config.stop_timeout_secs);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(status = %status, "Core stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(EngineError::Stop(e)),
            Err(_) => {
                tracing::warn!(grace_secs = grace.as_secs(), "Core ignored stop request, killing");
                child.kill().await.map_err(EngineError::Stop)
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        #[allow(clippy::cast_possible_wrap)]
        let target = Pid::from_raw(pid as i32);
        if let Err(e) = kill(target, Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "Cannot signal core");
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

async fn run_script(script: &str) -> EngineResult<()> {
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(script)
        .status()
        .await
        .map_err(|e| EngineError::Script {
            script: script.to_string(),
            reason: e.to_string(),
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(EngineError::Script {
            script: script.to_string(),
            reason: status.to_string(),
        })
    }
}

fn core_config_template() -> serde_json::Value {
    json!({
        "log": { "loglevel": "warning" },
        "inbounds": [],
        "outbounds": [
            { "protocol": "freedom", "tag": "direct" }
        ]
    })
}

#[async_trait]
impl ProxyEngine for CoreProcessManager {
    async fn apply_config(&self) -> EngineResult<()> {
        self.ensure_core_config()?;
        self.stop_child().await?;

        let binary = PathBuf::from(&self.config.binary_path);
        let child = Command::new(&binary)
            .args(self.core_args())
            .env("V2RAY_LOCATION_ASSET", &self.asset_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                binary: binary.clone(),
                source,
            })?;
        tracing::info!(binary = %binary.display(), pid = ?child.id(), "Core started");
        *self.child.lock().await = Some(child);

        if self.lite {
            return Ok(());
        }
        let setting = self.store.settings()?;
        if setting.transparent != TransparentMode::Close {
            if let Some(script) = &self.config.tproxy_setup_script {
                run_script(script).await?;
                self.tproxy_active.store(true, Ordering::SeqCst);
                tracing::info!(mode = ?setting.transparent, "Transparent proxy enabled");
            }
        }
        Ok(())
    }

    async fn stop_transparent_proxy(&self) -> EngineResult<()> {
        if self.lite {
            return Ok(());
        }
        let Some(script) = &self.config.tproxy_teardown_script else {
            return Ok(());
        };
        // Also runs when nothing is active, to clear rules left by a crashed run.
        run_script(script).await?;
        if self.tproxy_active.swap(false, Ordering::SeqCst) {
            tracing::info!("Transparent proxy disabled");
        }
        Ok(())
    }

    async fn stop_process_manager(&self) -> EngineResult<()> {
        self.stop_child().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn manager(dir: &Path, engine: EngineConfig, lite: bool) -> CoreProcessManager {
        let assets = AssetsConfig {
            asset_dir: dir.display().to_string(),
            ..Default::default()
        };
        CoreProcessManager::new(engine, &assets, Store::temporary().unwrap(), lite)
    }

    #[test]
    fn test_core_config_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineConfig {
            config_path: dir.path().join("v2ray/config.json").display().to_string(),
            ..Default::default()
        };
        let manager = manager(dir.path(), engine, true);

        assert!(manager.ensure_core_config().unwrap());
        assert!(!manager.ensure_core_config().unwrap());
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(manager.config_path()).unwrap()).unwrap();
        assert_eq!(written["outbounds"][0]["protocol"], "freedom");
    }

    #[tokio::test]
    async fn test_start_and_stop_core() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineConfig {
            binary_path: "/bin/sleep".into(),
            config_path: dir.path().join("config.json").display().to_string(),
            args: vec!["30".into()],
            ..Default::default()
        };
        let manager = manager(dir.path(), engine, true);

        manager.apply_config().await.unwrap();
        assert!(manager.is_core_running().await);

        manager.stop_process_manager().await.unwrap();
        assert!(!manager.is_core_running().await);
        manager.stop_process_manager().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_sends_sigterm_before_grace() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineConfig {
            binary_path: "/bin/sleep".into(),
            config_path: dir.path().join("config.json").display().to_string(),
            args: vec!["60".into()],
            stop_timeout_secs: 30,
            ..Default::default()
        };
        let manager = manager(dir.path(), engine, true);
        manager.apply_config().await.unwrap();

        let start = std::time::Instant::now();
        manager.stop_process_manager().await.unwrap();
        // SIGTERM ends sleep at once; only a missed signal waits out the grace period
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!manager.is_core_running().await);
    }

    #[tokio::test]
    async fn test_teardown_script_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("teardown-ran");
        let ok = EngineConfig {
            tproxy_teardown_script: Some(format!("touch {}", marker.display())),
            ..Default::default()
        };
        manager(dir.path(), ok, false).stop_transparent_proxy().await.unwrap();
        assert!(marker.exists());

        let failing = EngineConfig {
            tproxy_teardown_script: Some("exit 3".into()),
            ..Default::default()
        };
        assert!(matches!(
            manager(dir.path(), failing.clone(), false).stop_transparent_proxy().await,
            Err(EngineError::Script { .. })
        ));
        // lite mode never runs interception scripts
        manager(dir.path(), failing, true).stop_transparent_proxy().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineConfig {
            binary_path: dir.path().join("missing-core").display().to_string(),
            config_path: dir.path().join("config.json").display().to_string(),
            ..Default::default()
        };
        let manager = manager(dir.path(), engine, true);
        assert!(!manager.core_binary_present());
        assert!(matches!(manager.apply_config().await, Err(EngineError::Spawn { .. })));
    }
}
