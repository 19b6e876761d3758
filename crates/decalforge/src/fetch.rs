//! Downloads generated images into the per-job working area.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Stores the asset at `location` as `{job_id}_{asset_type}.png` in the
    /// working area and returns its path.
    async fn fetch(
        &self,
        job_id: &str,
        location: &str,
        asset_type: &str,
    ) -> Result<PathBuf, FetchError>;
}

/// Where an asset location points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    Remote(String),
    Local(PathBuf),
}

impl AssetLocation {
    /// `http(s)://` URLs are remote; `file://` URLs and bare paths are local.
    pub fn parse(location: &str) -> Result<Self, FetchError> {
        let trimmed = location.trim();
        if trimmed.is_empty() {
            return Err(FetchError::InvalidLocation(location.to_string()));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(AssetLocation::Remote(trimmed.to_string()));
        }
        if let Some(path) = trimmed.strip_prefix("file://") {
            if path.is_empty() {
                return Err(FetchError::InvalidLocation(location.to_string()));
            }
            return Ok(AssetLocation::Local(PathBuf::from(path)));
        }
        if trimmed.contains("://") {
            return Err(FetchError::InvalidLocation(location.to_string()));
        }
        Ok(AssetLocation::Local(PathBuf::from(trimmed)))
    }
}

/// Fetches over HTTP(S) with reqwest and copies local files.
pub struct HttpAssetFetcher {
    client: Client,
    work_dir: PathBuf,
}

impl HttpAssetFetcher {
    pub fn new(work_dir: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                source: e,
            })?;
        Ok(Self {
            client,
            work_dir: work_dir.into(),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let expected = response.content_length();
        let bytes = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            source: e,
        })?;

        if bytes.is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }
        if let Some(expected) = expected {
            if (bytes.len() as u64) < expected {
                return Err(FetchError::Truncated {
                    url: url.to_string(),
                    expected,
                    received: bytes.len() as u64,
                });
            }
        }
        Ok(bytes.to_vec())
    }

    async fn read_local(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| FetchError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody {
                url: path.display().to_string(),
            });
        }
        Ok(bytes)
    }
}

/// Writes `bytes` to `{target}.part`, then renames it into place. The
/// partial file is removed if the write fails.
async fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let mut part = target.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let result = async {
        tokio::fs::write(&part, bytes).await?;
        tokio::fs::rename(&part, target).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(FetchError::Io {
            path: target.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(
        &self,
        job_id: &str,
        location: &str,
        asset_type: &str,
    ) -> Result<PathBuf, FetchError> {
        let source = AssetLocation::parse(location)?;

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| FetchError::Io {
                path: self.work_dir.clone(),
                source: e,
            })?;

        let bytes = match source {
            AssetLocation::Remote(ref url) => self.download(url).await?,
            AssetLocation::Local(ref path) => self.read_local(path).await?,
        };

        let target = self.work_dir.join(format!("{}_{}.png", job_id, asset_type));
        write_atomically(&target, &bytes).await?;

        debug!(
            job_id = %job_id,
            asset_type = %asset_type,
            bytes = bytes.len(),
            path = %target.display(),
            "Asset stored"
        );
        Ok(target)
    }
}
