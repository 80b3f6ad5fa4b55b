use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::settings::{SettingsStore, HOST_LOCATION_KEY};
use crate::error::{HubError, HubResult};
use crate::logger;

const LOG_CTX: &str = "host_locator";

/// Operator interaction used when the host cannot be found automatically
///
/// Implementations block until the operator answers; the locator calls them
/// on a blocking thread. `None` means the operator cancelled.
pub trait OperatorPrompt: Send + Sync {
    fn pick_host_executable(&self, executable_name: &str) -> Option<PathBuf>;
}

/// Prompt for unattended runs: always cancels
pub struct NoPrompt;

impl OperatorPrompt for NoPrompt {
    fn pick_host_executable(&self, _executable_name: &str) -> Option<PathBuf> {
        None
    }
}

/// Resolves and persists the directory holding the host's binaries
pub struct HostLocator {
    settings: Arc<SettingsStore>,
    default_paths: Vec<PathBuf>,
    executable_name: String,
    prompt: Arc<dyn OperatorPrompt>,
}

impl HostLocator {
    pub fn new(
        settings: Arc<SettingsStore>,
        default_paths: Vec<PathBuf>,
        executable_name: impl Into<String>,
        prompt: Arc<dyn OperatorPrompt>,
    ) -> Self {
        Self {
            settings,
            default_paths,
            executable_name: executable_name.into(),
            prompt,
        }
    }

    /// Persisted location, if it still exists on disk
    pub async fn current(&self) -> Option<PathBuf> {
        let stored = self.settings.get_string(HOST_LOCATION_KEY).await?;
        let path = PathBuf::from(&stored);
        if path.is_dir() {
            Some(path)
        } else {
            logger::log_info(
                &format!("Stored vatSys location no longer exists: {}", stored),
                Some(LOG_CTX),
            );
            None
        }
    }

    /// Persisted path, else a well-known default, else ask the operator
    ///
    /// Returns None only when the operator cancels the picker.
    pub async fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = self.current().await {
            return Some(path);
        }

        if let Some(default) = self.default_paths.iter().find(|p| p.is_dir()) {
            logger::log_info(
                &format!("Adopting default vatSys location: {:?}", default),
                Some(LOG_CTX),
            );
            self.persist(default).await;
            return Some(default.clone());
        }

        let picked = self.prompt_operator().await?;
        let dir = match picked.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => {
                logger::log_error(
                    &format!("Picked file has no parent directory: {:?}", picked),
                    Some(LOG_CTX),
                );
                return None;
            }
        };

        let picked_name_matches = picked
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(&self.executable_name));
        if !picked_name_matches {
            logger::log_warn(
                &format!(
                    "Picked {:?} instead of {}, using its folder anyway",
                    picked, self.executable_name
                ),
                Some(LOG_CTX),
            );
        }

        self.persist(&dir).await;
        Some(dir)
    }

    /// Overwrite the stored location with an existing directory
    pub async fn set(&self, dir: &Path) -> HubResult<()> {
        if !dir.is_dir() {
            return Err(HubError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            )));
        }
        self.settings
            .set(HOST_LOCATION_KEY, dir.to_string_lossy().to_string())
            .await
    }

    async fn prompt_operator(&self) -> Option<PathBuf> {
        let prompt = Arc::clone(&self.prompt);
        let executable = self.executable_name.clone();
        match tokio::task::spawn_blocking(move || prompt.pick_host_executable(&executable)).await
        {
            Ok(Some(path)) => Some(path),
            Ok(None) => {
                logger::log_info("vatSys location selection cancelled", Some(LOG_CTX));
                None
            }
            Err(e) => {
                logger::log_error(&format!("Prompt task failed: {}", e), Some(LOG_CTX));
                None
            }
        }
    }

    async fn persist(&self, dir: &Path) {
        if let Err(e) = self
            .settings
            .set(HOST_LOCATION_KEY, dir.to_string_lossy().to_string())
            .await
        {
            logger::log_error(
                &format!("Failed to persist vatSys location: {}", e),
                Some(LOG_CTX),
            );
        }
    }
}
