//! Privileged filesystem execution
//!
//! Every mutation of the plugin root is described up front as an
//! [`ElevatedPlan`] of typed [`FsOp`]s. A plan is then handed to a
//! [`PrivilegedExecutor`], which either applies it directly or renders it as
//! one script and runs that script with elevation, so the operator sees at
//! most one prompt per plan.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{HubError, HubResult};
use crate::logger;

mod in_process;
pub mod script;

pub use in_process::InProcessExecutor;
pub use script::{ScriptDialect, ScriptExecutor};

/// One filesystem step of a plan
///
/// Removals succeed when the target is already gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    CreateDir { path: PathBuf },
    CopyFile { from: PathBuf, to: PathBuf },
    /// Copy the contents of `from` into `to`, creating `to`
    CopyDir { from: PathBuf, to: PathBuf },
    Move { from: PathBuf, to: PathBuf },
    RemoveFile { path: PathBuf },
    RemoveDir { path: PathBuf },
    /// Expand a zip archive into `destination`
    ExpandArchive { archive: PathBuf, destination: PathBuf },
    /// Write a small UTF-8 payload, replacing any existing file
    WriteFile { path: PathBuf, contents: String },
    VerifyExists { path: PathBuf },
    VerifyAbsent { path: PathBuf },
}

/// Ordered list of filesystem steps with a label for logs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElevatedPlan {
    label: String,
    ops: Vec<FsOp>,
}

impl ElevatedPlan {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ops: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ops(&self) -> &[FsOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(mut self, op: FsOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn create_dir(self, path: impl AsRef<Path>) -> Self {
        self.push(FsOp::CreateDir {
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn copy_file(self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Self {
        self.push(FsOp::CopyFile {
            from: from.as_ref().to_path_buf(),
            to: to.as_ref().to_path_buf(),
        })
    }

    pub fn copy_dir(self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Self {
        self.push(FsOp::CopyDir {
            from: from.as_ref().to_path_buf(),
            to: to.as_ref().to_path_buf(),
        })
    }

    pub fn move_path(self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Self {
        self.push(FsOp::Move {
            from: from.as_ref().to_path_buf(),
            to: to.as_ref().to_path_buf(),
        })
    }

    pub fn remove_file(self, path: impl AsRef<Path>) -> Self {
        self.push(FsOp::RemoveFile {
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn remove_dir(self, path: impl AsRef<Path>) -> Self {
        self.push(FsOp::RemoveDir {
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn expand_archive(self, archive: impl AsRef<Path>, destination: impl AsRef<Path>) -> Self {
        self.push(FsOp::ExpandArchive {
            archive: archive.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
        })
    }

    pub fn write_file(self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.push(FsOp::WriteFile {
            path: path.as_ref().to_path_buf(),
            contents: contents.into(),
        })
    }

    pub fn verify_exists(self, path: impl AsRef<Path>) -> Self {
        self.push(FsOp::VerifyExists {
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn verify_absent(self, path: impl AsRef<Path>) -> Self {
        self.push(FsOp::VerifyAbsent {
            path: path.as_ref().to_path_buf(),
        })
    }
}

/// What a successful run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Captured helper output (empty for in-process runs)
    pub output: String,
    /// Whether the plan ran with elevated rights
    pub elevated: bool,
}

#[async_trait]
pub trait PrivilegedExecutor: Send + Sync {
    /// Apply every op of the plan in order, stopping at the first failure
    async fn run(&self, plan: &ElevatedPlan) -> HubResult<ExecOutput>;
}

/// How an elevated helper is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationMode {
    /// Run the rendered script with the current rights
    None,
    /// `Start-Process -Verb RunAs` (UAC prompt)
    PowerShellRunAs,
    /// polkit `pkexec`
    Pkexec,
    /// non-interactive `sudo -n`
    Sudo,
}

impl ElevationMode {
    pub fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            ElevationMode::PowerShellRunAs
        } else {
            ElevationMode::Pkexec
        }
    }

    /// Parse a configuration value; `auto` picks the platform default
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::platform_default()),
            "none" | "off" => Some(ElevationMode::None),
            "runas" | "powershell" => Some(ElevationMode::PowerShellRunAs),
            "pkexec" => Some(ElevationMode::Pkexec),
            "sudo" => Some(ElevationMode::Sudo),
            _ => None,
        }
    }

    /// Script dialect the helper interprets
    pub fn dialect(self) -> ScriptDialect {
        match self {
            ElevationMode::PowerShellRunAs => ScriptDialect::PowerShell,
            ElevationMode::Pkexec | ElevationMode::Sudo => ScriptDialect::Posix,
            ElevationMode::None => ScriptDialect::native(),
        }
    }
}

/// Direct first, then one elevated retry of the whole plan on access denial
pub struct AdaptiveExecutor {
    direct: Arc<dyn PrivilegedExecutor>,
    elevated: Arc<dyn PrivilegedExecutor>,
}

impl AdaptiveExecutor {
    pub fn new(direct: Arc<dyn PrivilegedExecutor>, elevated: Arc<dyn PrivilegedExecutor>) -> Self {
        Self { direct, elevated }
    }
}

#[async_trait]
impl PrivilegedExecutor for AdaptiveExecutor {
    async fn run(&self, plan: &ElevatedPlan) -> HubResult<ExecOutput> {
        match self.direct.run(plan).await {
            Err(HubError::Io(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                logger::log_info(
                    &format!("{}: access denied ({}), retrying elevated", plan.label(), e),
                    Some("elevation"),
                );
                self.elevated.run(plan).await
            }
            other => other,
        }
    }
}

/// Executor for the configured elevation mode
pub fn build_executor(mode: ElevationMode, timeout: Duration) -> Arc<dyn PrivilegedExecutor> {
    match mode {
        ElevationMode::None => Arc::new(InProcessExecutor),
        mode => Arc::new(AdaptiveExecutor::new(
            Arc::new(InProcessExecutor),
            Arc::new(ScriptExecutor::new(mode, timeout)),
        )),
    }
}
