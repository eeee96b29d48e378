//! Remote fetching seam.
//!
//! Everything the daemon pulls from the network (tag listings, asset
//! files, subscription bodies, release metadata) goes through
//! [`AssetFetcher`], so tests can substitute a canned implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while fetching or installing remote content.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("cannot decode response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    #[error("no tags published for {0}")]
    NoTags(String),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl AssetError {
    pub(crate) fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        AssetError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Fetches remote resources over HTTP.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// GET `url` and return the body of a successful response.
    async fn get(&self, url: &str) -> AssetResult<Vec<u8>>;

    /// GET `url` and write the body to `dest`.
    async fn download(&self, url: &str, dest: &Path) -> AssetResult<()> {
        let body = self.get(url).await?;
        tokio::fs::write(dest, body)
            .await
            .map_err(|e| AssetError::io("write", dest, e))
    }
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> AssetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("proxyd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| AssetError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> AssetResult<Vec<u8>> {
        let http_err = |source| AssetError::Http {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(http_err)?;
        Ok(body.to_vec())
    }
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Latest tag name from a tag listing: element 0's `name`.
pub fn parse_latest_tag(url: &str, body: &[u8]) -> AssetResult<Option<String>> {
    let tags: Vec<TagEntry> = serde_json::from_slice(body).map_err(|source| AssetError::Decode {
        url: url.to_string(),
        source,
    })?;
    Ok(tags.into_iter().next().map(|t| t.name).filter(|n| !n.is_empty()))
}

/// Resolve the most recent tag of `repo`.
pub async fn latest_tag(
    fetcher: &dyn AssetFetcher,
    tag_api_base: &str,
    repo: &str,
) -> AssetResult<String> {
    let url = format!("{}/{}/tags", tag_api_base.trim_end_matches('/'), repo);
    let body = fetcher.get(&url).await?;
    parse_latest_tag(&url, &body)?.ok_or_else(|| AssetError::NoTags(repo.to_string()))
}
