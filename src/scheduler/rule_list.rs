//! Rule-list (GFWList) dataset refresh.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::assets::fetcher::latest_tag;
use crate::assets::provisioner::{download_url, install};
use crate::assets::{AssetError, AssetFetcher};
use crate::config::{AssetSpec, AssetsConfig};
use crate::scheduler::UpdateResult;

/// Keeps the local rule-list dataset current.
#[async_trait]
pub trait RuleListSource: Send + Sync {
    /// Install the latest dataset if the local copy is older.
    ///
    /// Returns the version now installed.
    async fn check_and_update(&self) -> UpdateResult<String>;
}

/// Rule list published as tagged releases of a repository.
pub struct GithubRuleList {
    fetcher: Arc<dyn AssetFetcher>,
    tag_api_base: String,
    mirror_base: String,
    spec: AssetSpec,
    asset_dir: PathBuf,
}

impl GithubRuleList {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, assets: &AssetsConfig, spec: AssetSpec) -> Self {
        Self {
            fetcher,
            tag_api_base: assets.tag_api_base.clone(),
            mirror_base: assets.mirror_base.clone(),
            spec,
            asset_dir: PathBuf::from(&assets.asset_dir),
        }
    }

    fn version_marker(&self) -> PathBuf {
        self.asset_dir.join(format!("{}.version", self.spec.local_name))
    }

    /// Version recorded next to the installed dataset, if any.
    pub async fn local_version(&self) -> Option<String> {
        if !self.asset_dir.join(&self.spec.local_name).exists() {
            return None;
        }
        let version = tokio::fs::read_to_string(self.version_marker()).await.ok()?;
        let version = version.trim();
        (!version.is_empty()).then(|| version.to_string())
    }
}

#[async_trait]
impl RuleListSource for GithubRuleList {
    async fn check_and_update(&self) -> UpdateResult<String> {
        let remote = latest_tag(self.fetcher.as_ref(), &self.tag_api_base, &self.spec.repo).await?;
        if self.local_version().await.as_deref() == Some(remote.as_str()) {
            tracing::debug!(version = %remote, "Rule list already up to date");
            return Ok(remote);
        }

        tokio::fs::create_dir_all(&self.asset_dir)
            .await
            .map_err(|e| AssetError::io("create", &self.asset_dir, e))?;
        let url = download_url(&self.mirror_base, &self.spec.repo, &remote, &self.spec.filename);
        install(
            self.fetcher.as_ref(),
            &url,
            &self.asset_dir,
            &self.spec.filename,
            &self.spec.local_name,
        )
        .await?;

        let marker = self.version_marker();
        tokio::fs::write(&marker, &remote)
            .await
            .map_err(|e| AssetError::io("write", &marker, e))?;
        Ok(remote)
    }
}
