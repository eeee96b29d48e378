//! Geo-data asset provisioning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assets::fetcher::{latest_tag, AssetError, AssetFetcher, AssetResult};
use crate::config::{AssetSpec, AssetsConfig};
use crate::observability::metrics;

/// Versioned mirror URL: `{mirror}/{repo}@{tag}/{filename}`.
pub fn download_url(mirror_base: &str, repo: &str, tag: &str, filename: &str) -> String {
    format!("{}/{}@{}/{}", mirror_base.trim_end_matches('/'), repo, tag, filename)
}

/// Download `url` into `dir` under the upstream `filename`, make it
/// executable-readable, then rename it to `local_name`.
pub async fn install(
    fetcher: &dyn AssetFetcher,
    url: &str,
    dir: &Path,
    filename: &str,
    local_name: &str,
) -> AssetResult<PathBuf> {
    let staging = dir.join(format!("{}.tmp", filename));
    let target = dir.join(local_name);

    fetcher.download(url, &staging).await?;
    if let Err(e) = set_mode(&staging).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e);
    }
    tokio::fs::rename(&staging, &target)
        .await
        .map_err(|e| AssetError::io("rename", &staging, e))?;
    Ok(target)
}

#[cfg(unix)]
async fn set_mode(path: &Path) -> AssetResult<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| AssetError::io("chmod", path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path) -> AssetResult<()> {
    Ok(())
}

/// Result of provisioning one asset.
#[derive(Debug)]
pub enum AssetStatus {
    Present,
    Installed { tag: String, path: PathBuf },
    Failed(AssetError),
}

/// Per-asset outcome of a provisioning pass.
#[derive(Debug)]
pub struct AssetReport {
    pub local_name: String,
    pub status: AssetStatus,
}

/// Ensures the required geo-data files exist in the asset directory.
pub struct AssetProvisioner {
    config: AssetsConfig,
    fetcher: Arc<dyn AssetFetcher>,
}

impl AssetProvisioner {
    pub fn new(config: AssetsConfig, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn asset_dir(&self) -> &Path {
        Path::new(&self.config.asset_dir)
    }

    /// Whether every required asset is already present.
    pub fn all_present(&self) -> bool {
        self.config
            .required
            .iter()
            .all(|spec| self.asset_dir().join(&spec.local_name).exists())
    }

    /// Install every missing asset. One failure never blocks the others.
    pub async fn provision(&self) -> Vec<AssetReport> {
        let mut reports = Vec::with_capacity(self.config.required.len());
        for spec in &self.config.required {
            let status = if self.asset_dir().join(&spec.local_name).exists() {
                AssetStatus::Present
            } else {
                tracing::warn!(asset = %spec.filename, repo = %spec.repo, "Installing missing asset");
                match self.provision_one(spec).await {
                    Ok((tag, path)) => {
                        tracing::info!(asset = %spec.local_name, tag = %tag, path = %path.display(), "Asset installed");
                        metrics::record_asset_provision(&spec.local_name, true);
                        AssetStatus::Installed { tag, path }
                    }
                    Err(e) => {
                        tracing::warn!(repo = %spec.repo, error = %e, "Asset provisioning failed");
                        metrics::record_asset_provision(&spec.local_name, false);
                        AssetStatus::Failed(e)
                    }
                }
            };
            reports.push(AssetReport {
                local_name: spec.local_name.clone(),
                status,
            });
        }
        reports
    }

    async fn provision_one(&self, spec: &AssetSpec) -> AssetResult<(String, PathBuf)> {
        let tag = latest_tag(self.fetcher.as_ref(), &self.config.tag_api_base, &spec.repo).await?;
        let url = download_url(&self.config.mirror_base, &spec.repo, &tag, &spec.filename);
        tokio::fs::create_dir_all(self.asset_dir())
            .await
            .map_err(|e| AssetError::io("create", self.asset_dir(), e))?;
        let path = install(
            self.fetcher.as_ref(),
            &url,
            self.asset_dir(),
            &spec.filename,
            &spec.local_name,
        )
        .await?;
        Ok((tag, path))
    }
}
