use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structured error codes for replies crossing the core boundary
/// These allow callers to distinguish between different failure kinds
/// and display appropriate messages or take specific actions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No install root could be resolved
    HostNotConfigured,
    /// The host application is running
    HostBusy,
    /// Download or release lookup failed
    NetworkError,
    /// Archive payload not found in the expected shape
    MalformedArchive,
    /// Operator declined the elevation prompt
    ElevationDenied,
    /// Privileged step ran but did not succeed
    ExecutionFailed,
    /// Plugin name is not a valid filesystem leaf
    InvalidPluginName,
    /// Settings store could not be read or written
    SettingsError,
    /// Local filesystem error
    IoError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::HostNotConfigured => write!(f, "host_not_configured"),
            ErrorCode::HostBusy => write!(f, "host_busy"),
            ErrorCode::NetworkError => write!(f, "network_error"),
            ErrorCode::MalformedArchive => write!(f, "malformed_archive"),
            ErrorCode::ElevationDenied => write!(f, "elevation_denied"),
            ErrorCode::ExecutionFailed => write!(f, "execution_failed"),
            ErrorCode::InvalidPluginName => write!(f, "invalid_plugin_name"),
            ErrorCode::SettingsError => write!(f, "settings_error"),
            ErrorCode::IoError => write!(f, "io_error"),
        }
    }
}

/// Failure taxonomy of the launcher core
///
/// A version string that cannot be parsed is deliberately absent: it is a
/// degraded-data condition handled by [`crate::version::VersionComparison`],
/// not a failure.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("vatSys location is not configured")]
    HostNotConfigured,

    #[error("{process} is running, close it before changing plugins")]
    HostBusy { process: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("elevation denied: {0}")]
    ElevationDenied(String),

    #[error("privileged operation failed: {message}")]
    ExecutionFailed { message: String, output: String },

    #[error("invalid plugin name: {0:?}")]
    InvalidPluginName(String),

    #[error("settings store error: {0}")]
    Settings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HubError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HubError::HostNotConfigured => ErrorCode::HostNotConfigured,
            HubError::HostBusy { .. } => ErrorCode::HostBusy,
            HubError::Network(_) => ErrorCode::NetworkError,
            HubError::MalformedArchive(_) => ErrorCode::MalformedArchive,
            HubError::ElevationDenied(_) => ErrorCode::ElevationDenied,
            HubError::ExecutionFailed { .. } => ErrorCode::ExecutionFailed,
            HubError::InvalidPluginName(_) => ErrorCode::InvalidPluginName,
            HubError::Settings(_) => ErrorCode::SettingsError,
            HubError::Io(_) => ErrorCode::IoError,
        }
    }

    pub fn execution_failed(message: impl Into<String>, output: impl Into<String>) -> Self {
        HubError::ExecutionFailed {
            message: message.into(),
            output: output.into(),
        }
    }

    /// Operator-facing message including any captured helper output
    pub fn diagnostic(&self) -> String {
        match self {
            HubError::ExecutionFailed { message, output } if !output.trim().is_empty() => {
                format!("{} (output: {})", message, output.trim())
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        HubError::Network(err.to_string())
    }
}

/// Convert from anyhow::Error raised inside blocking helpers
///
/// Archive helpers report through anyhow; anything mentioning the archive
/// is classified as malformed, the rest keeps its io kind when present.
impl From<anyhow::Error> for HubError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(hub) = err.downcast_ref::<HubError>() {
            return match hub {
                HubError::MalformedArchive(m) => HubError::MalformedArchive(m.clone()),
                HubError::Network(m) => HubError::Network(m.clone()),
                _ => HubError::execution_failed(format!("{:#}", err), String::new()),
            };
        }

        let message = format!("{:#}", err);
        let message_lower = message.to_lowercase();
        if message_lower.contains("archive")
            || message_lower.contains("zip")
            || message_lower.contains("7z")
            || message_lower.contains("extract")
        {
            return HubError::MalformedArchive(message);
        }

        match err.downcast::<std::io::Error>() {
            Ok(io) => HubError::Io(io),
            Err(other) => HubError::execution_failed(format!("{:#}", other), String::new()),
        }
    }
}

pub type HubResult<T> = std::result::Result<T, HubError>;
