//! Shared path validation utilities
//!
//! Plugin names double as filesystem leaf names and flow into generated
//! scripts, so they are validated before anything touches the disk.
//! Archive entry paths are sanitized so extraction cannot escape its root.

use std::path::{Component, Path, PathBuf};

use crate::error::{HubError, HubResult};

/// Validate a plugin name as a single filesystem leaf
pub fn validate_plugin_name(name: &str) -> HubResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains(':')
        || name.chars().any(|c| c.is_control())
    {
        return Err(HubError::InvalidPluginName(name.to_string()));
    }
    Ok(())
}

/// Sanitize a file path to prevent path traversal attacks
/// Returns None if the path is unsafe (contains `..` or is absolute)
pub fn sanitize_path(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::CurDir => {}              // Skip "."
            Component::ParentDir => return None, // Reject ".."
            Component::Prefix(_) | Component::RootDir => return None, // Reject absolute paths
        }
    }
    if result.as_os_str().is_empty() {
        None
    } else {
        Some(result)
    }
}

/// Case-insensitive lookup of a direct child file by name
pub fn find_child_file(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let exact = dir.join(file_name);
    if exact.is_file() {
        return Some(exact);
    }
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .find(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.eq_ignore_ascii_case(file_name))
        })
        .map(|e| e.path())
}

/// True when the path carries the given extension, ignoring case
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_names() {
        assert!(validate_plugin_name("vatACARS").is_ok());
        assert!(validate_plugin_name("Vatpac Plugin").is_ok());
        assert!(validate_plugin_name("").is_err());
        assert!(validate_plugin_name("..").is_err());
        assert!(validate_plugin_name("a/b").is_err());
        assert!(validate_plugin_name("a\\b").is_err());
        assert!(validate_plugin_name("C:evil").is_err());
        assert!(validate_plugin_name(" padded").is_err());
        assert!(validate_plugin_name("bad\nname").is_err());
    }

    #[test]
    fn test_sanitize_path_normal() {
        let path = Path::new("folder/subfolder/file.txt");
        let result = sanitize_path(path);
        assert_eq!(result, Some(PathBuf::from("folder/subfolder/file.txt")));
    }

    #[test]
    fn test_sanitize_path_rejects_parent_dir() {
        let path = Path::new("folder/../../../etc/passwd");
        assert!(sanitize_path(path).is_none(), "Path with .. should be rejected");
    }

    #[test]
    fn test_sanitize_path_rejects_absolute_unix() {
        let path = Path::new("/etc/passwd");
        assert!(sanitize_path(path).is_none(), "Absolute Unix path should be rejected");
    }

    #[test]
    fn test_sanitize_path_handles_current_dir() {
        let path = Path::new("./folder/./file.txt");
        assert_eq!(sanitize_path(path), Some(PathBuf::from("folder/file.txt")));
    }

    #[test]
    fn test_find_child_file_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Version.JSON"), "{}").unwrap();

        let found = find_child_file(dir.path(), "version.json").unwrap();
        assert!(found.ends_with("Version.JSON"));
        assert!(find_child_file(dir.path(), "other.json").is_none());
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("Plugin.DLL"), "dll"));
        assert!(!has_extension(Path::new("Plugin.dll.bak"), "dll"));
        assert!(!has_extension(Path::new("Plugin"), "dll"));
    }
}
