//! Artifact staging: download, isolated extraction, payload search
//!
//! Nothing here writes into the plugin root. Downloads and extractions live
//! in unique temporary directories under the staging root and are removed
//! when their owning guard drops, on success and failure alike.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use crate::error::{HubError, HubResult};
use crate::logger;
use crate::models::ArchiveFormat;

pub mod extraction;
pub mod payload;

pub use payload::locate_payload;

/// What to accept when an archive has a binary but no version metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadPolicy {
    /// Fail with a malformed-archive error
    Strict,
    /// Use the shallowest binary-only directory and log a warning
    AllowBinaryOnly,
}

impl PayloadPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "strict" => Some(PayloadPolicy::Strict),
            "allow-binary-only" | "lenient" => Some(PayloadPolicy::AllowBinaryOnly),
            _ => None,
        }
    }
}

/// Extracted archive plus the directory found to hold the plugin
///
/// Dropping it deletes the whole extraction.
#[derive(Debug)]
pub struct StagedPayload {
    _extraction: TempDir,
    payload_dir: PathBuf,
}

impl StagedPayload {
    pub fn payload_dir(&self) -> &Path {
        &self.payload_dir
    }
}

/// Percentage of `total`, clamped, or None without a declared length
pub fn progress_percent(downloaded: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => {
            Some((downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
        }
        _ => None,
    }
}

/// Longest wait for response headers or the next body chunk
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ArtifactStager {
    client: reqwest::Client,
    staging_root: PathBuf,
    policy: PayloadPolicy,
    idle_timeout: Duration,
}

impl ArtifactStager {
    pub fn new(client: reqwest::Client, staging_root: impl Into<PathBuf>, policy: PayloadPolicy) -> Self {
        Self {
            client,
            staging_root: staging_root.into(),
            policy,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn policy(&self) -> PayloadPolicy {
        self.policy
    }

    /// Fresh private directory under the staging root
    pub fn workspace(&self, prefix: &str) -> HubResult<TempDir> {
        std::fs::create_dir_all(&self.staging_root)?;
        Ok(tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.staging_root)?)
    }

    /// Stream `url` into `destination`, reporting `(bytes, percent)` per chunk
    ///
    /// A stall longer than the idle timeout is a network error. A partially
    /// written destination is removed on failure.
    pub async fn download<F>(&self, url: &str, destination: &Path, mut on_progress: F) -> HubResult<u64>
    where
        F: FnMut(u64, Option<f64>) + Send,
    {
        logger::log_info(&format!("Downloading {}", url), Some("stager"));

        let response = tokio::time::timeout(self.idle_timeout, self.client.get(url).send())
            .await
            .map_err(|_| HubError::Network(format!("GET {} timed out waiting for a response", url)))??;
        let status = response.status();
        if !status.is_success() {
            return Err(HubError::Network(format!("GET {} returned {}", url, status)));
        }

        let total = response.content_length();
        let result = async {
            let mut file = tokio::fs::File::create(destination).await?;
            let mut stream = response.bytes_stream();
            let mut downloaded = 0u64;
            loop {
                let next = tokio::time::timeout(self.idle_timeout, stream.next())
                    .await
                    .map_err(|_| {
                        HubError::Network(format!(
                            "download of {} stalled after {} bytes",
                            url, downloaded
                        ))
                    })?;
                let chunk = match next {
                    Some(chunk) => chunk?,
                    None => break,
                };
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                on_progress(downloaded, progress_percent(downloaded, total));
            }
            file.flush().await?;
            Ok::<u64, HubError>(downloaded)
        }
        .await;

        match result {
            Ok(bytes) => {
                logger::log_info(
                    &format!("Downloaded {} bytes to {:?}", bytes, destination),
                    Some("stager"),
                );
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(destination).await;
                logger::log_error(&format!("Download of {} failed: {}", url, e), Some("stager"));
                Err(e)
            }
        }
    }

    /// Extract into an isolated directory and locate the payload inside it
    pub async fn stage(&self, archive: &Path, format: ArchiveFormat) -> HubResult<StagedPayload> {
        let extraction = self.workspace("extract-")?;
        let root = extraction.path().to_path_buf();
        let archive = archive.to_path_buf();
        let policy = self.policy;

        let payload_dir = tokio::task::spawn_blocking(move || -> HubResult<PathBuf> {
            extraction::extract_with_format(&archive, &root, format)?;
            locate_payload(&root, policy)
        })
        .await
        .map_err(|e| HubError::execution_failed(format!("extraction task failed: {}", e), ""))??;

        crate::log_debug!(&format!("Staged payload at {:?}", payload_dir), "stager");
        Ok(StagedPayload {
            _extraction: extraction,
            payload_dir,
        })
    }
}
