//! GitHub Releases lookups

use serde::Deserialize;
use std::time::Duration;

use crate::error::{HubError, HubResult};
use crate::logger;
use crate::models::{ArtifactKind, ReleaseInfo};

/// `releases/latest` response, trimmed to what is used
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<RemoteAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl RemoteRelease {
    /// First asset with a recognized extension, narrowed to `kind` when the
    /// plugin declares one
    pub fn select_asset(&self, kind: Option<&ArtifactKind>) -> Option<(&RemoteAsset, ArtifactKind)> {
        self.assets.iter().find_map(|asset| {
            let asset_kind = ArtifactKind::from_asset_name(&asset.name)?;
            match kind {
                Some(wanted) if wanted.label() != asset_kind.label() => None,
                _ => Some((asset, asset_kind)),
            }
        })
    }

    pub fn into_release_info(self, kind: Option<&ArtifactKind>) -> Option<ReleaseInfo> {
        let (asset, asset_kind) = self.select_asset(kind)?;
        Some(ReleaseInfo {
            asset_url: asset.browser_download_url.clone(),
            asset_name: asset.name.clone(),
            asset_kind,
            tag_version: self.tag_name.clone(),
            title: self.name.clone().unwrap_or_default(),
            body_text: self.body.clone().unwrap_or_default(),
        })
    }
}

pub struct ReleaseClient {
    client: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

impl ReleaseClient {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub async fn latest(&self, repository: &str) -> HubResult<RemoteRelease> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, repository);
        logger::log_debug(&format!("Fetching {}", url), Some("release"), None);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(HubError::Network(format!(
                "release API returned {} for {} ({})",
                status,
                repository,
                error_text.trim()
            )));
        }

        response
            .json::<RemoteRelease>()
            .await
            .map_err(|e| HubError::Network(format!("failed to parse release metadata: {}", e)))
    }

    /// Latest release reduced to one installable asset
    ///
    /// `Ok(None)` when the release carries no recognized asset.
    pub async fn latest_plugin_release(
        &self,
        repository: &str,
        kind: Option<&ArtifactKind>,
    ) -> HubResult<Option<ReleaseInfo>> {
        let release = self.latest(repository).await?;
        let tag = release.tag_name.clone();
        let info = release.into_release_info(kind);
        if info.is_none() {
            logger::log_info(
                &format!("No DLL or archive asset in {} {}", repository, tag),
                Some("release"),
            );
        }
        Ok(info)
    }
}
