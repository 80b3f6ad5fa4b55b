//! Runtime configuration
//!
//! Defaults target a stock vatSys install on Windows. Every field can be
//! overridden from the environment so the CLI and tests can point the core
//! at a different data directory, release API or elevation helper.

use std::path::PathBuf;
use std::time::Duration;

use crate::common::app_dirs;
use crate::elevation::ElevationMode;
use crate::stager::PayloadPolicy;

const ENV_DATA_DIR: &str = "VATACARS_HUB_DATA_DIR";
const ENV_API_URL: &str = "VATACARS_HUB_API_URL";
const ENV_ELEVATION: &str = "VATACARS_HUB_ELEVATION";
const ENV_PAYLOAD_POLICY: &str = "VATACARS_HUB_PAYLOAD_POLICY";

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const HOST_EXECUTABLE: &str = "vatSys.exe";
pub const PLUGIN_SUBDIR: &str = "Plugins";

/// Repository the launcher itself is released from
pub const HUB_REPOSITORY: &str = "vatacars/hub";

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Private data directory (settings, logs, install logs, staging)
    pub data_dir: PathBuf,
    /// Base URL of the GitHub-compatible release API
    pub api_base: String,
    /// Host executable, used for both process detection and the file picker
    pub host_executable: String,
    /// Plugin root relative to the host location
    pub plugin_subdir: String,
    /// Default host locations tried before prompting
    pub default_host_paths: Vec<PathBuf>,
    /// How privileged plans are run when direct access is denied
    pub elevation: ElevationMode,
    /// Upper bound on one elevated helper run
    pub elevation_timeout: Duration,
    /// What to do when an archive holds a binary but no version metadata
    pub payload_policy: PayloadPolicy,
    pub http_timeout: Duration,
    /// Longest silence tolerated while downloading an asset
    pub download_idle_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            data_dir: app_dirs::get_app_data_dir(),
            api_base: DEFAULT_API_URL.to_string(),
            host_executable: HOST_EXECUTABLE.to_string(),
            plugin_subdir: PLUGIN_SUBDIR.to_string(),
            default_host_paths: vec![
                PathBuf::from(r"C:\Program Files (x86)\vatSys\bin"),
                PathBuf::from(r"C:\Program Files\vatSys\bin"),
            ],
            elevation: ElevationMode::platform_default(),
            elevation_timeout: Duration::from_secs(10 * 60),
            payload_policy: PayloadPolicy::AllowBinaryOnly,
            http_timeout: Duration::from_secs(30),
            download_idle_timeout: crate::stager::DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl HubConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = std::env::var_os(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                config.api_base = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(mode) = std::env::var(ENV_ELEVATION) {
            match ElevationMode::parse(&mode) {
                Some(m) => config.elevation = m,
                None => crate::logger::log_warn(
                    &format!("Ignoring unknown {}={}", ENV_ELEVATION, mode),
                    Some("config"),
                ),
            }
        }
        if let Ok(policy) = std::env::var(ENV_PAYLOAD_POLICY) {
            match PayloadPolicy::parse(&policy) {
                Some(p) => config.payload_policy = p,
                None => crate::logger::log_warn(
                    &format!("Ignoring unknown {}={}", ENV_PAYLOAD_POLICY, policy),
                    Some("config"),
                ),
            }
        }

        config
    }

    pub fn settings_path(&self) -> PathBuf {
        app_dirs::settings_path(&self.data_dir)
    }

    pub fn staging_dir(&self) -> PathBuf {
        app_dirs::staging_dir(&self.data_dir)
    }
}
