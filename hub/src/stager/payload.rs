use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use super::PayloadPolicy;
use crate::common::path_utils::{find_child_file, has_extension};
use crate::error::{HubError, HubResult};
use crate::logger;

pub const METADATA_FILE: &str = "version.json";
pub const BINARY_EXTENSION: &str = "dll";
const MAX_SEARCH_DEPTH: usize = 4;

#[derive(Debug, Default)]
struct DirContents {
    has_binary: bool,
    has_metadata: bool,
    subdirs: Vec<PathBuf>,
}

fn inspect(dir: &Path) -> DirContents {
    let mut contents = DirContents {
        has_metadata: find_child_file(dir, METADATA_FILE).is_some(),
        ..Default::default()
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return contents,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => contents.subdirs.push(path),
            Ok(t) if t.is_file() && has_extension(&path, BINARY_EXTENSION) => {
                contents.has_binary = true
            }
            _ => {}
        }
    }
    contents.subdirs.sort();
    contents
}

/// Find the plugin payload directory inside an extraction root
///
/// Breadth-first from the root: the first directory holding both a binary
/// and `version.json` wins, siblings are visited in name order. Under
/// [`PayloadPolicy::AllowBinaryOnly`] the shallowest binary-only directory is
/// the fallback. A directory with only metadata is never a payload.
pub fn locate_payload(root: &Path, policy: PayloadPolicy) -> HubResult<PathBuf> {
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);
    let mut binary_only: Option<PathBuf> = None;

    while let Some((dir, depth)) = queue.pop_front() {
        let contents = inspect(&dir);
        if contents.has_binary && contents.has_metadata {
            return Ok(dir);
        }
        if contents.has_binary && binary_only.is_none() {
            binary_only = Some(dir.clone());
        }
        if depth < MAX_SEARCH_DEPTH {
            queue.extend(contents.subdirs.into_iter().map(|d| (d, depth + 1)));
        }
    }

    match (policy, binary_only) {
        (PayloadPolicy::AllowBinaryOnly, Some(dir)) => {
            logger::log_warn(
                &format!(
                    "No {} next to the plugin binary, using {:?} as payload",
                    METADATA_FILE, dir
                ),
                Some("stager"),
            );
            Ok(dir)
        }
        _ => Err(HubError::MalformedArchive(format!(
            "no directory contains both a .{} and {}",
            BINARY_EXTENSION, METADATA_FILE
        ))),
    }
}
