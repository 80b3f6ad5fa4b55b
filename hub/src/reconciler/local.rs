//! Local install state, derived from the plugin root on every query

use std::path::{Path, PathBuf};

use crate::common::path_utils::find_child_file;
use crate::common::settings::{plugin_version_key, SettingsStore};
use crate::models::{InstallLayout, InstallRecord};
use crate::stager::payload::{BINARY_EXTENSION, METADATA_FILE};
use crate::version::{self, VersionSource};

/// Where each layout of one plugin lives inside the plugin root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginPaths {
    pub root: PathBuf,
    /// `<root>/<name>/`
    pub directory: PathBuf,
    /// `<root>/<name>.dll`
    pub flat_file: PathBuf,
    /// `<root>/<name>.version.json`
    pub sidecar: PathBuf,
}

impl PluginPaths {
    pub fn new(root: &Path, name: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            directory: root.join(name),
            flat_file: root.join(format!("{}.{}", name, BINARY_EXTENSION)),
            sidecar: root.join(sidecar_name(name)),
        }
    }

    pub fn flat_file_with_extension(&self, name: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, extension))
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.directory, &self.flat_file, &self.sidecar]
    }
}

pub fn sidecar_name(name: &str) -> String {
    format!("{}.version.json", name)
}

async fn metadata_version(path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let raw = String::from_utf8_lossy(&bytes);
    version::extract(VersionSource::Metadata(&raw))
}

async fn binary_version(path: PathBuf) -> Option<String> {
    tokio::task::spawn_blocking(move || version::extract(VersionSource::BinaryFile(&path)))
        .await
        .ok()
        .flatten()
}

/// Inspect the plugin root for `name`
///
/// A directory install wins over a flat file. Directory installs read their
/// own `version.json`, then the binary's file version. Flat-file installs read
/// the sidecar, then the binary, then the persisted fallback.
pub async fn derive_record(root: &Path, name: &str, settings: &SettingsStore) -> InstallRecord {
    let paths = PluginPaths::new(root, name);

    if paths.directory.is_dir() {
        let mut installed_version = match find_child_file(&paths.directory, METADATA_FILE) {
            Some(meta) => metadata_version(&meta).await,
            None => None,
        };
        if installed_version.is_none() {
            let binary = format!("{}.{}", name, BINARY_EXTENSION);
            if let Some(dll) = find_child_file(&paths.directory, &binary) {
                installed_version = binary_version(dll).await;
            }
        }
        return InstallRecord {
            installed: true,
            installed_version,
            install_path: Some(paths.directory),
            layout: Some(InstallLayout::Directory),
        };
    }

    let binary = format!("{}.{}", name, BINARY_EXTENSION);
    let flat = match find_child_file(root, &binary) {
        Some(path) => path,
        None => return InstallRecord::not_installed(),
    };

    let mut installed_version = match find_child_file(root, &sidecar_name(name)) {
        Some(sidecar) => metadata_version(&sidecar).await,
        None => None,
    };
    if installed_version.is_none() {
        installed_version = binary_version(flat.clone()).await;
    }
    if installed_version.is_none() {
        installed_version = settings
            .get_string(&plugin_version_key(name))
            .await
            .and_then(|v| version::normalize(&v));
    }

    InstallRecord {
        installed: true,
        installed_version,
        install_path: Some(flat),
        layout: Some(InstallLayout::FlatFile),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    async fn store(dir: &Path) -> SettingsStore {
        SettingsStore::open(dir.join("settings.json")).unwrap()
    }

    #[tokio::test]
    async fn test_nothing_installed() {
        let dir = tempfile::tempdir().unwrap();
        let record = derive_record(dir.path(), "OzStrips", &store(dir.path()).await).await;
        assert_eq!(record, InstallRecord::not_installed());
    }

    #[tokio::test]
    async fn test_directory_reads_components_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = dir.path().join("vatACARS");
        fs::create_dir_all(&plugin).unwrap();
        fs::write(plugin.join("vatACARS.dll"), b"MZ").unwrap();
        fs::write(plugin.join("Version.json"), br#"{"Major":1,"Minor":4}"#).unwrap();

        let record = derive_record(dir.path(), "vatACARS", &store(dir.path()).await).await;
        assert!(record.installed);
        assert_eq!(record.layout, Some(InstallLayout::Directory));
        assert_eq!(record.installed_version.as_deref(), Some("1.4.0"));
    }

    #[tokio::test]
    async fn test_directory_never_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vatACARS")).unwrap();
        let settings = store(dir.path()).await;
        settings
            .set(&plugin_version_key("vatACARS"), "9.9.9")
            .await
            .unwrap();

        let record = derive_record(dir.path(), "vatACARS", &settings).await;
        assert!(record.installed);
        assert_eq!(record.installed_version, None);
    }

    #[tokio::test]
    async fn test_flat_file_sidecar_then_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("VatpacPlugin.dll"), b"MZ").unwrap();
        let settings = store(dir.path()).await;
        settings
            .set(&plugin_version_key("VatpacPlugin"), "v2.1")
            .await
            .unwrap();

        let record = derive_record(dir.path(), "VatpacPlugin", &settings).await;
        assert_eq!(record.layout, Some(InstallLayout::FlatFile));
        assert_eq!(record.installed_version.as_deref(), Some("2.1.0"));

        fs::write(
            dir.path().join("VatpacPlugin.version.json"),
            "\u{feff}\"2.3.0\"",
        )
        .unwrap();
        let record = derive_record(dir.path(), "VatpacPlugin", &settings).await;
        assert_eq!(record.installed_version.as_deref(), Some("2.3.0"));
    }
}
