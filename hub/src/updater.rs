use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::common::settings::{SettingsStore, LAST_UPDATE_CHECK_KEY};
use crate::error::HubResult;
use crate::release::ReleaseClient;
use crate::version::{self, VersionComparison};

/// Self-update information for the launcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub current_version: String,
    pub latest_version: String,
    pub is_update_available: bool,
    pub release_notes: String,
    pub release_url: String,
    pub published_at: String,
}

/// Checks the launcher's own releases; downloading is left to the shell
pub struct UpdateChecker<'a> {
    releases: &'a ReleaseClient,
    settings: Arc<SettingsStore>,
    repository: String,
    current_version: String,
    cache_duration: Duration,
}

impl<'a> UpdateChecker<'a> {
    pub fn new(releases: &'a ReleaseClient, settings: Arc<SettingsStore>, repository: &str) -> Self {
        Self {
            releases,
            settings,
            repository: repository.to_string(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            cache_duration: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }

    pub fn with_current_version(mut self, version: &str) -> Self {
        self.current_version = version.to_string();
        self
    }

    /// `Ok(None)` when a non-manual check ran within the cache window
    pub async fn check_for_updates(&self, manual: bool) -> HubResult<Option<UpdateInfo>> {
        if !manual && !self.should_check_update().await {
            crate::logger::log_debug(
                "Skipping update check (cache not expired)",
                Some("updater"),
                None,
            );
            return Ok(None);
        }

        let latest_release = self.releases.latest(&self.repository).await?;
        let latest_version = version::normalize(&latest_release.tag_name)
            .unwrap_or_else(|| latest_release.tag_name.trim_start_matches('v').to_string());

        let is_update_available = matches!(
            version::compare(&self.current_version, &latest_version),
            VersionComparison::RemoteNewer
        );

        self.update_last_check_time().await;

        let update_info = UpdateInfo {
            current_version: self.current_version.clone(),
            latest_version,
            is_update_available,
            release_notes: latest_release.body.unwrap_or_default(),
            release_url: latest_release.html_url.unwrap_or_default(),
            published_at: latest_release.published_at.unwrap_or_default(),
        };

        if is_update_available {
            crate::logger::log_info(
                &format!(
                    "Update available: {} -> {}",
                    update_info.current_version, update_info.latest_version
                ),
                Some("updater"),
            );
        } else {
            crate::logger::log_info("No update available", Some("updater"));
        }

        Ok(Some(update_info))
    }

    async fn should_check_update(&self) -> bool {
        match self.settings.get_as::<u64>(LAST_UPDATE_CHECK_KEY).await {
            Some(last) => {
                let elapsed = Duration::from_secs(now_secs().saturating_sub(last));
                elapsed >= self.cache_duration
            }
            None => true, // Never checked before
        }
    }

    async fn update_last_check_time(&self) {
        if let Err(e) = self.settings.set(LAST_UPDATE_CHECK_KEY, now_secs()).await {
            crate::logger::log_error(
                &format!("Failed to record update check time: {}", e),
                Some("updater"),
            );
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
