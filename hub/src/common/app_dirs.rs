//! Centralized app data directory management
//!
//! All persistent data (settings, logs, install logs, staging) should use
//! paths from this module to ensure consistent storage location across the
//! application.

use std::path::{Path, PathBuf};

/// App identifier used for the private data directory
const APP_IDENTIFIER: &str = "com.vatacars.hub";

/// Get the app data directory for persistent storage
///
/// Returns platform-specific paths:
/// - Windows: %LOCALAPPDATA%\com.vatacars.hub
/// - macOS: ~/Library/Application Support/com.vatacars.hub
/// - Linux: ~/.local/share/com.vatacars.hub (or $XDG_DATA_HOME)
pub fn get_app_data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join(APP_IDENTIFIER);
    }

    // Fallback to current directory
    PathBuf::from(".").join(APP_IDENTIFIER)
}

/// Get the logs directory
pub fn logs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Get the settings file path
pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

/// Get the directory holding one install log per plugin
pub fn install_logs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("install-logs")
}

/// Get the install log path for a plugin
pub fn install_log_path(data_dir: &Path, plugin_name: &str) -> PathBuf {
    install_logs_dir(data_dir).join(format!("{}.log", plugin_name))
}

/// Get the staging root for downloads and archive extraction
pub fn staging_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("staging")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_data_dir_not_empty() {
        let dir = get_app_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_paths_contain_app_identifier() {
        let data_dir = get_app_data_dir();
        assert!(data_dir.to_string_lossy().contains(APP_IDENTIFIER));
    }

    #[test]
    fn test_install_log_keyed_by_plugin() {
        let base = Path::new("/data");
        let path = install_log_path(base, "OzStrips");
        assert_eq!(path, base.join("install-logs").join("OzStrips.log"));
    }
}
