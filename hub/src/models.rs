use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Archive container formats the stager can extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZip => "7z",
        }
    }
}

/// Install layout implied by a release asset
///
/// Archives install as a self-contained `<name>/` directory, single files as
/// `<name>.<ext>` plus a sidecar version file in the shared plugin root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ArtifactKind {
    File { extension: String },
    Archive { format: ArchiveFormat },
}

impl ArtifactKind {
    /// Classify an asset by its file name; unrecognized names yield None
    pub fn from_asset_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArtifactKind::Archive {
                format: ArchiveFormat::Zip,
            })
        } else if lower.ends_with(".7z") {
            Some(ArtifactKind::Archive {
                format: ArchiveFormat::SevenZip,
            })
        } else if lower.ends_with(".dll") {
            Some(ArtifactKind::File {
                extension: "dll".to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, ArtifactKind::Archive { .. })
    }

    /// Extension used for the downloaded file
    pub fn extension(&self) -> &str {
        match self {
            ArtifactKind::File { extension } => extension,
            ArtifactKind::Archive { format } => format.extension(),
        }
    }

    /// Short form used on the request boundary (`"file"` / `"archive"`)
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::File { .. } => "file",
            ArtifactKind::Archive { .. } => "archive",
        }
    }
}

/// A manageable plugin, supplied per operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub name: String,
    pub artifact_kind: Option<ArtifactKind>,
    /// `owner/repo` on the release host
    pub source_repository: String,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, source_repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact_kind: None,
            source_repository: source_repository.into(),
        }
    }
}

/// Remote truth for one plugin, fetched fresh per operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// Raw tag, may not be a valid semantic version
    pub tag_version: String,
    pub title: String,
    pub body_text: String,
    pub asset_url: String,
    pub asset_name: String,
    pub asset_kind: ArtifactKind,
}

impl ReleaseInfo {
    /// Canonical remote version: valid tag, else title, else body
    pub fn remote_version(&self) -> Option<String> {
        crate::version::remote_version(&self.tag_version, &self.title, &self.body_text)
    }
}

/// Which on-disk layout a plugin currently uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallLayout {
    Directory,
    FlatFile,
}

/// Local truth for one plugin, derived from the filesystem on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    pub installed: bool,
    pub installed_version: Option<String>,
    pub install_path: Option<PathBuf>,
    pub layout: Option<InstallLayout>,
}

impl InstallRecord {
    pub fn not_installed() -> Self {
        Self {
            installed: false,
            installed_version: None,
            install_path: None,
            layout: None,
        }
    }
}

/// Status values of the reconciler state machine as they appear in replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    Checking,
    NotAvailable,
    UpToDate,
    UpdateAvailable,
    NotInstalled,
    Downloading,
    Installing,
    Uninstalling,
    Done,
    Failed,
    /// Host application running; the operation was refused untouched
    Running,
}

impl PluginStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PluginStatus::NotAvailable
                | PluginStatus::UpToDate
                | PluginStatus::UpdateAvailable
                | PluginStatus::NotInstalled
                | PluginStatus::Done
                | PluginStatus::Failed
                | PluginStatus::Running
        )
    }
}

/// Install/update request crossing the core boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub plugin_name: String,
    pub download_url: String,
    /// Version the caller believes it is installing (release tag)
    pub version: Option<String>,
    pub artifact_kind: ArtifactKind,
}

/// Progress or terminal reply for one plugin operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub plugin_name: String,
    pub status: PluginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEvent {
    pub fn new(plugin_name: &str, status: PluginStatus) -> Self {
        Self {
            plugin_name: plugin_name.to_string(),
            status,
            bytes: None,
            percent: None,
            version: None,
            error: None,
        }
    }

    pub fn progress(plugin_name: &str, bytes: u64, percent: Option<f64>) -> Self {
        Self {
            bytes: Some(bytes),
            percent,
            ..Self::new(plugin_name, PluginStatus::Downloading)
        }
    }

    pub fn failed(plugin_name: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(plugin_name, PluginStatus::Failed)
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Result of one status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginReport {
    pub plugin_name: String,
    pub status: PluginStatus,
    pub record: InstallRecord,
    pub remote_version: Option<String>,
    pub release: Option<ReleaseInfo>,
    /// Why the plugin is not available, when it is not
    pub reason: Option<String>,
}

impl PluginReport {
    pub fn not_available(plugin_name: &str, reason: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.to_string(),
            status: PluginStatus::NotAvailable,
            record: InstallRecord::not_installed(),
            remote_version: None,
            release: None,
            reason: Some(reason.into()),
        }
    }
}
