//! Daemon release check.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assets::{AssetError, AssetFetcher};
use crate::scheduler::UpdateResult;

/// Last known release state, exposed by the management API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionStatus {
    pub found_new: bool,
    pub remote_version: String,
}

/// Reports the latest published daemon version.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_version(&self) -> UpdateResult<String>;
}

#[derive(Deserialize)]
struct Release {
    tag_name: String,
}

/// Release metadata endpoint returning `{"tag_name": ...}`.
pub struct GithubReleases {
    fetcher: Arc<dyn AssetFetcher>,
    url: String,
}

impl GithubReleases {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn latest_version(&self) -> UpdateResult<String> {
        let body = self.fetcher.get(&self.url).await?;
        let release: Release = serde_json::from_slice(&body).map_err(|source| AssetError::Decode {
            url: self.url.clone(),
            source,
        })?;
        Ok(release.tag_name)
    }
}

/// Whether `remote` is a newer version than `current`.
///
/// Versions compare by numeric dot-separated components with an optional
/// leading `v`. Anything else only counts as newer when it differs.
pub fn is_newer(remote: &str, current: &str) -> bool {
    match (components(remote), components(current)) {
        (Some(remote), Some(current)) => remote > current,
        _ => !remote.trim().is_empty() && remote.trim() != current.trim(),
    }
}

fn components(version: &str) -> Option<Vec<u64>> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    let core = version.split(['-', '+']).next()?;
    let mut parts: Vec<u64> = core
        .split('.')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    while parts.len() > 1 && parts.last() == Some(&0) {
        parts.pop();
    }
    Some(parts)
}
