use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use super::{ElevatedPlan, ExecOutput, FsOp, PrivilegedExecutor};
use crate::error::{HubError, HubResult};
use crate::logger;

/// Applies plans with the current process rights
///
/// Io failures keep their kind so a caller can tell access denial apart.
pub struct InProcessExecutor;

#[async_trait]
impl PrivilegedExecutor for InProcessExecutor {
    async fn run(&self, plan: &ElevatedPlan) -> HubResult<ExecOutput> {
        if plan.is_empty() {
            return Ok(ExecOutput::default());
        }

        let label = plan.label().to_string();
        let ops = plan.ops().to_vec();
        tokio::task::spawn_blocking(move || {
            for op in &ops {
                apply_op(op)?;
            }
            logger::log_debug(
                &format!("{}: applied {} ops in-process", label, ops.len()),
                Some("elevation"),
                None,
            );
            Ok(ExecOutput::default())
        })
        .await
        .map_err(|e| HubError::execution_failed(format!("executor task failed: {}", e), ""))?
    }
}

fn apply_op(op: &FsOp) -> HubResult<()> {
    match op {
        FsOp::CreateDir { path } => fs::create_dir_all(path).map_err(|e| at(path, e))?,
        FsOp::CopyFile { from, to } => {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| at(parent, e))?;
            }
            fs::copy(from, to).map_err(|e| at(to, e))?;
        }
        FsOp::CopyDir { from, to } => copy_dir_contents(from, to)?,
        FsOp::Move { from, to } => move_path(from, to)?,
        FsOp::RemoveFile { path } => match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(at(path, e)),
            _ => {}
        },
        FsOp::RemoveDir { path } => match fs::remove_dir_all(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(at(path, e)),
            _ => {}
        },
        FsOp::ExpandArchive {
            archive,
            destination,
        } => {
            crate::stager::extraction::extract_archive(archive, destination)?;
        }
        FsOp::WriteFile { path, contents } => {
            fs::write(path, contents.as_bytes()).map_err(|e| at(path, e))?
        }
        FsOp::VerifyExists { path } => {
            if !path.exists() {
                return Err(HubError::execution_failed(
                    format!("expected path is missing: {}", path.display()),
                    "",
                ));
            }
        }
        FsOp::VerifyAbsent { path } => {
            if path.exists() {
                return Err(HubError::execution_failed(
                    format!("path still present: {}", path.display()),
                    "",
                ));
            }
        }
    }
    Ok(())
}

/// Attach the path to an io error without losing its kind
fn at(path: &Path, err: io::Error) -> HubError {
    HubError::Io(io::Error::new(
        err.kind(),
        format!("{}: {}", path.display(), err),
    ))
}

fn copy_dir_contents(from: &Path, to: &Path) -> HubResult<()> {
    fs::create_dir_all(to).map_err(|e| at(to, e))?;

    for entry in WalkDir::new(from).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            at(&path, io::Error::other(e.to_string()))
        })?;
        let relative = match entry.path().strip_prefix(from) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| at(&target, e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|e| at(&target, e))?;
        } else {
            logger::log_debug(
                &format!("Skipping non-regular entry {:?}", entry.path()),
                Some("elevation"),
                None,
            );
        }
    }
    Ok(())
}

/// Rename, falling back to copy and delete across filesystems
fn move_path(from: &Path, to: &Path) -> HubResult<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(at(to, e)),
        Err(e) => {
            logger::log_debug(
                &format!("Rename failed ({}), falling back to copy+delete", e),
                Some("elevation"),
                None,
            );
            if from.is_dir() {
                copy_dir_contents(from, to)?;
                fs::remove_dir_all(from).map_err(|e| at(from, e))?;
            } else {
                fs::copy(from, to).map_err(|e| at(to, e))?;
                fs::remove_file(from).map_err(|e| at(from, e))?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plan_applies_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let stage = dir.path().join("stage");
        fs::create_dir_all(stage.join("sub")).unwrap();
        fs::write(stage.join("Plugin.dll"), b"dll").unwrap();
        fs::write(stage.join("sub").join("data.xml"), b"<x/>").unwrap();

        let target = dir.path().join("Plugins").join("Plugin");
        let plan = ElevatedPlan::new("install")
            .remove_dir(&target)
            .copy_dir(&stage, &target)
            .write_file(target.join("version.json"), r#"{"version":"1.0.0"}"#)
            .verify_exists(target.join("Plugin.dll"));

        let out = InProcessExecutor.run(&plan).await.unwrap();
        assert!(!out.elevated);
        assert!(target.join("sub").join("data.xml").is_file());
        assert_eq!(
            fs::read_to_string(target.join("version.json")).unwrap(),
            r#"{"version":"1.0.0"}"#
        );
    }

    #[tokio::test]
    async fn test_removals_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let plan = ElevatedPlan::new("uninstall")
            .remove_file(dir.path().join("gone.dll"))
            .remove_dir(dir.path().join("gone"))
            .verify_absent(dir.path().join("gone"));
        InProcessExecutor.run(&plan).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_failure_stops_plan() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("after");
        let plan = ElevatedPlan::new("verify")
            .verify_exists(dir.path().join("missing"))
            .create_dir(&marker);

        let err = InProcessExecutor.run(&plan).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ExecutionFailed);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_move_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.dll");
        let to = dir.path().join("b.dll");
        fs::write(&from, b"x").unwrap();

        InProcessExecutor
            .run(&ElevatedPlan::new("mv").move_path(&from, &to))
            .await
            .unwrap();
        assert!(!from.exists());
        assert!(to.is_file());
    }
}
