//! Settings key-value store
//!
//! A flat JSON object persisted in the app data directory. Each get/set is
//! serialized behind one async mutex and every write goes through a temp file
//! plus rename, so a crash never leaves a truncated settings file. There are
//! no cross-key transactions.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{HubError, HubResult};
use crate::logger;

/// Directory holding the host's binaries (vatSys `bin`)
pub const HOST_LOCATION_KEY: &str = "vatsysPath";

/// Unix timestamp of the last launcher update check
pub const LAST_UPDATE_CHECK_KEY: &str = "lastUpdateCheck";

/// Best-effort fallback version of a flat-file plugin
pub fn plugin_version_key(plugin_name: &str) -> String {
    format!("pluginVersion.{}", plugin_name)
}

pub struct SettingsStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl SettingsStore {
    /// Open (or lazily create) the store at `path`
    ///
    /// An unreadable file is moved aside as `<file>.corrupt` and the store
    /// starts empty instead of failing the whole launcher.
    pub fn open(path: impl Into<PathBuf>) -> HubResult<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    logger::log_error(
                        &format!("Settings file {:?} is corrupt ({}), starting empty", path, e),
                        Some("settings"),
                    );
                    let _ = fs::rename(&path, path.with_extension("json.corrupt"));
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(HubError::Settings(format!("{:?}: {}", path, e))),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().await.get(key).cloned()
    }

    /// Typed read; a value of the wrong shape reads as absent
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key).await? {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: T) -> HubResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| HubError::Settings(format!("{}: {}", key, e)))?;
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    pub async fn remove(&self, key: &str) -> HubResult<()> {
        let mut values = self.values.lock().await;
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }

    fn persist(&self, values: &Map<String, Value>) -> HubResult<()> {
        let data = serde_json::to_vec_pretty(values)
            .map_err(|e| HubError::Settings(e.to_string()))?;
        write_file_atomic(&self.path, &data)
            .map_err(|e| HubError::Settings(format!("{:?}: {:#}", self.path, e)))
    }
}

fn write_file_atomic(destination: &Path, data: &[u8]) -> anyhow::Result<()> {
    use anyhow::Context;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid settings file name: {}", destination.display()))?;
    let temp_path = destination.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    fs::write(&temp_path, data)
        .with_context(|| format!("Failed to write temporary file '{}'", temp_path.display()))?;
    fs::rename(&temp_path, destination).with_context(|| {
        format!(
            "Failed to replace '{}' with '{}'",
            destination.display(),
            temp_path.display()
        )
    })?;
    Ok(())
}
