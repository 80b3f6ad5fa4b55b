//! Rendering plans as helper scripts and running them elevated
//!
//! Every path and text value is emitted as a single-quoted literal of the
//! target dialect. Success is signalled by a per-run sentinel line the
//! script prints only after its last op; the exit code alone is never
//! trusted, since elevation wrappers do not reliably propagate it.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{ElevatedPlan, ElevationMode, ExecOutput, FsOp, PrivilegedExecutor};
use crate::error::{HubError, HubResult};
use crate::logger;

const LOG_CTX: &str = "elevation";
pub const SENTINEL_PREFIX: &str = "VATACARS_HUB_OK_";

/// Quote as a PowerShell verbatim string
pub fn quote_powershell(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote as a POSIX shell single-quoted word
pub fn quote_posix(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn ps(path: &Path) -> String {
    quote_powershell(&path.to_string_lossy())
}

fn sh(path: &Path) -> String {
    quote_posix(&path.to_string_lossy())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDialect {
    PowerShell,
    Posix,
}

impl ScriptDialect {
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            ScriptDialect::PowerShell
        } else {
            ScriptDialect::Posix
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ScriptDialect::PowerShell => "plan.ps1",
            ScriptDialect::Posix => "plan.sh",
        }
    }

    /// Render the whole plan as one script
    ///
    /// With `output_file` set, PowerShell output is appended to that file
    /// instead of stdout. Posix scripts always write to stdout.
    pub fn render(self, plan: &ElevatedPlan, sentinel: &str, output_file: Option<&Path>) -> String {
        match self {
            ScriptDialect::PowerShell => render_powershell(plan, sentinel, output_file),
            ScriptDialect::Posix => render_posix(plan, sentinel),
        }
    }
}

fn render_powershell(plan: &ElevatedPlan, sentinel: &str, output_file: Option<&Path>) -> String {
    let mut script = String::new();
    script.push_str("$ErrorActionPreference = 'Stop'\r\n");
    match output_file {
        Some(path) => {
            let _ = write!(
                script,
                "function Write-HubLine([string]$Line) {{ [System.IO.File]::AppendAllText({}, $Line + \"`r`n\") }}\r\n",
                ps(path)
            );
        }
        None => script.push_str("function Write-HubLine([string]$Line) { Write-Output $Line }\r\n"),
    }
    script.push_str("try {\r\n");

    for op in plan.ops() {
        let line = match op {
            FsOp::CreateDir { path } => format!(
                "New-Item -ItemType Directory -Force -Path {} | Out-Null",
                ps(path)
            ),
            FsOp::CopyFile { from, to } => format!(
                "Copy-Item -LiteralPath {} -Destination {} -Force",
                ps(from),
                ps(to)
            ),
            FsOp::CopyDir { from, to } => format!(
                "New-Item -ItemType Directory -Force -Path {to} | Out-Null; \
                 Get-ChildItem -LiteralPath {from} -Force | Copy-Item -Destination {to} -Recurse -Force",
                from = ps(from),
                to = ps(to)
            ),
            FsOp::Move { from, to } => format!(
                "Move-Item -LiteralPath {} -Destination {} -Force",
                ps(from),
                ps(to)
            ),
            FsOp::RemoveFile { path } => format!(
                "if (Test-Path -LiteralPath {p}) {{ Remove-Item -LiteralPath {p} -Force }}",
                p = ps(path)
            ),
            FsOp::RemoveDir { path } => format!(
                "if (Test-Path -LiteralPath {p}) {{ Remove-Item -LiteralPath {p} -Recurse -Force }}",
                p = ps(path)
            ),
            FsOp::ExpandArchive {
                archive,
                destination,
            } => format!(
                "Expand-Archive -LiteralPath {} -DestinationPath {} -Force",
                ps(archive),
                ps(destination)
            ),
            FsOp::WriteFile { path, contents } => format!(
                "[System.IO.File]::WriteAllText({}, {})",
                ps(path),
                quote_powershell(contents)
            ),
            FsOp::VerifyExists { path } => format!(
                "if (-not (Test-Path -LiteralPath {p})) {{ throw ('Expected path is missing: ' + {p}) }}",
                p = ps(path)
            ),
            FsOp::VerifyAbsent { path } => format!(
                "if (Test-Path -LiteralPath {p}) {{ throw ('Path still present: ' + {p}) }}",
                p = ps(path)
            ),
        };
        let _ = write!(script, "    {}\r\n", line);
    }

    let _ = write!(
        script,
        "    Write-HubLine {}\r\n}} catch {{\r\n    Write-HubLine ('ERROR: ' + $_.Exception.Message)\r\n    exit 1\r\n}}\r\n",
        quote_powershell(sentinel)
    );
    script
}

fn render_posix(plan: &ElevatedPlan, sentinel: &str) -> String {
    let mut script = String::from("#!/bin/sh\nset -e\n");

    for op in plan.ops() {
        let line = match op {
            FsOp::CreateDir { path } => format!("mkdir -p {}", sh(path)),
            FsOp::CopyFile { from, to } => format!("cp -f {} {}", sh(from), sh(to)),
            FsOp::CopyDir { from, to } => format!(
                "mkdir -p {to} && cp -Rf {from} {to}",
                from = quote_posix(&format!("{}/.", from.to_string_lossy())),
                to = sh(to)
            ),
            FsOp::Move { from, to } => format!("mv -f {} {}", sh(from), sh(to)),
            FsOp::RemoveFile { path } => format!("rm -f {}", sh(path)),
            FsOp::RemoveDir { path } => format!("rm -rf {}", sh(path)),
            FsOp::ExpandArchive {
                archive,
                destination,
            } => format!("unzip -o -q {} -d {}", sh(archive), sh(destination)),
            FsOp::WriteFile { path, contents } => {
                format!("printf '%s' {} > {}", quote_posix(contents), sh(path))
            }
            FsOp::VerifyExists { path } => format!(
                "test -e {p} || {{ echo 'Expected path is missing: '{p}; exit 1; }}",
                p = sh(path)
            ),
            FsOp::VerifyAbsent { path } => format!(
                "test ! -e {p} || {{ echo 'Path still present: '{p}; exit 1; }}",
                p = sh(path)
            ),
        };
        script.push_str(&line);
        script.push('\n');
    }

    let _ = writeln!(script, "echo {}", quote_posix(sentinel));
    script
}

/// Runs rendered plans through an elevation helper
pub struct ScriptExecutor {
    mode: ElevationMode,
    dialect: ScriptDialect,
    timeout: Duration,
}

impl ScriptExecutor {
    pub fn new(mode: ElevationMode, timeout: Duration) -> Self {
        Self {
            mode,
            dialect: mode.dialect(),
            timeout,
        }
    }

    pub fn with_dialect(mut self, dialect: ScriptDialect) -> Self {
        self.dialect = dialect;
        self
    }

    fn command(&self, script_path: &Path) -> Command {
        let script = script_path.to_string_lossy().to_string();
        let mut cmd = match (self.mode, self.dialect) {
            (ElevationMode::PowerShellRunAs, _) => {
                // The elevated child cannot share our stdout, it reports
                // through the output file instead.
                let inner = format!(
                    "-NoProfile -NonInteractive -ExecutionPolicy Bypass -File \"{}\"",
                    script
                );
                let launcher = format!(
                    "Start-Process -FilePath 'powershell.exe' -ArgumentList {} -Verb RunAs -Wait -WindowStyle Hidden",
                    quote_powershell(&inner)
                );
                let mut c = Command::new("powershell");
                c.args(["-NoProfile", "-NonInteractive", "-Command", &launcher]);
                c
            }
            (ElevationMode::Pkexec, _) => {
                let mut c = Command::new("pkexec");
                c.args(["sh", &script]);
                c
            }
            (ElevationMode::Sudo, _) => {
                let mut c = Command::new("sudo");
                c.args(["-n", "sh", &script]);
                c
            }
            (ElevationMode::None, ScriptDialect::PowerShell) => {
                let mut c = Command::new("powershell");
                c.args([
                    "-NoProfile",
                    "-NonInteractive",
                    "-ExecutionPolicy",
                    "Bypass",
                    "-File",
                    &script,
                ]);
                c
            }
            (ElevationMode::None, ScriptDialect::Posix) => {
                let mut c = Command::new("sh");
                c.arg(&script);
                c
            }
        };

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Write `script` to a private directory, run it and check the sentinel
    pub(crate) async fn run_script(
        &self,
        script: &str,
        sentinel: &str,
        output_file: Option<PathBuf>,
        workdir: &Path,
    ) -> HubResult<ExecOutput> {
        let script_path = workdir.join(self.dialect.file_name());
        tokio::fs::write(&script_path, script).await?;

        let child = self.command(&script_path).spawn().map_err(|e| {
            HubError::execution_failed(format!("failed to launch {:?} helper: {}", self.mode, e), "")
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HubError::execution_failed(
                    format!("helper timed out after {}s", self.timeout.as_secs()),
                    "",
                ))
            }
        };

        let mut captured = String::from_utf8_lossy(&output.stdout).to_string();
        if let Some(path) = &output_file {
            if let Ok(text) = tokio::fs::read_to_string(path).await {
                captured.push_str(&text);
            }
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        interpret(
            self.mode,
            output.status.code(),
            output.status.success(),
            &captured,
            &stderr,
            sentinel,
        )
    }
}

/// Map helper results to success or a classified failure
fn interpret(
    mode: ElevationMode,
    exit_code: Option<i32>,
    success: bool,
    stdout: &str,
    stderr: &str,
    sentinel: &str,
) -> HubResult<ExecOutput> {
    // Windows PowerShell 5.1 prefixes files it creates with a BOM
    let stdout = stdout.trim_start_matches('\u{feff}');
    if stdout
        .lines()
        .any(|l| l.trim_start_matches('\u{feff}').trim() == sentinel)
    {
        return Ok(ExecOutput {
            output: stdout.replace(sentinel, "").trim().to_string(),
            elevated: mode != ElevationMode::None,
        });
    }

    let combined = format!("{}{}", stdout, stderr).trim().to_string();
    let lower = combined.to_lowercase();
    let denied = match mode {
        ElevationMode::PowerShellRunAs => {
            lower.contains("canceled by the user") || lower.contains("cancelled by the user")
        }
        ElevationMode::Pkexec => matches!(exit_code, Some(126) | Some(127)),
        ElevationMode::Sudo => lower.contains("password is required"),
        ElevationMode::None => false,
    };
    if denied {
        return Err(HubError::ElevationDenied(combined));
    }

    let message = if success {
        "helper exited cleanly without confirming completion".to_string()
    } else {
        match exit_code {
            Some(code) => format!("helper exited with code {}", code),
            None => "helper was terminated".to_string(),
        }
    };
    Err(HubError::execution_failed(message, combined))
}

#[async_trait]
impl PrivilegedExecutor for ScriptExecutor {
    async fn run(&self, plan: &ElevatedPlan) -> HubResult<ExecOutput> {
        if plan.is_empty() {
            return Ok(ExecOutput::default());
        }

        let workdir = tempfile::Builder::new()
            .prefix("vatacars-hub-elevate-")
            .tempdir()?;
        let sentinel = format!("{}{}", SENTINEL_PREFIX, uuid::Uuid::new_v4().simple());
        let output_file = match self.mode {
            ElevationMode::PowerShellRunAs => Some(workdir.path().join("output.txt")),
            _ => None,
        };
        let script = self.dialect.render(plan, &sentinel, output_file.as_deref());

        logger::log_info(
            &format!(
                "{}: running {} ops via {:?}",
                plan.label(),
                plan.ops().len(),
                self.mode
            ),
            Some(LOG_CTX),
        );

        let result = self
            .run_script(&script, &sentinel, output_file, workdir.path())
            .await;
        if let Err(e) = &result {
            logger::log_error(
                &format!("{}: {}", plan.label(), e.diagnostic()),
                Some(LOG_CTX),
            );
        }
        result
    }
}
