use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;

use crate::common::path_utils::{has_extension, sanitize_path};
use crate::logger;
use crate::models::ArchiveFormat;

/// Counts reported after an extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    /// Entries dropped because their path would escape the target
    pub skipped: usize,
}

/// Extract by looking at the archive's extension
pub fn extract_archive(archive: &Path, target: &Path) -> Result<ExtractionSummary> {
    let format = if has_extension(archive, "7z") {
        ArchiveFormat::SevenZip
    } else if has_extension(archive, "zip") {
        ArchiveFormat::Zip
    } else {
        anyhow::bail!("Unsupported archive type: {}", archive.display());
    };
    extract_with_format(archive, target, format)
}

pub fn extract_with_format(
    archive: &Path,
    target: &Path,
    format: ArchiveFormat,
) -> Result<ExtractionSummary> {
    fs::create_dir_all(target)
        .with_context(|| format!("Failed to create extraction dir {}", target.display()))?;

    let summary = match format {
        ArchiveFormat::Zip => extract_zip(archive, target),
        ArchiveFormat::SevenZip => extract_7z(archive, target),
    }?;

    if summary.skipped > 0 {
        logger::log_info(
            &format!(
                "Skipped {} unsafe or invalid entries in {}",
                summary.skipped,
                archive.display()
            ),
            Some("extraction"),
        );
    }
    Ok(summary)
}

fn extract_zip(archive_path: &Path, target: &Path) -> Result<ExtractionSummary> {
    use zip::ZipArchive;

    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).context("Failed to read zip archive")?;
    let mut summary = ExtractionSummary::default();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry {}", i))?;

        let relative = match entry.enclosed_name().and_then(|p| sanitize_path(&p)) {
            Some(p) => p,
            None => {
                logger::log_debug(
                    &format!("Skipping zip entry with unsafe path: {}", entry.name()),
                    Some("extraction"),
                    None,
                );
                summary.skipped += 1;
                continue;
            }
        };
        let dest_path = target.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&dest_path)
            .with_context(|| format!("Failed to create {}", dest_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract zip entry {}", entry.name()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode | 0o600));
        }

        summary.files += 1;
    }

    Ok(summary)
}

fn extract_7z(archive: &Path, target: &Path) -> Result<ExtractionSummary> {
    let mut reader = sevenz_rust2::ArchiveReader::open(archive, sevenz_rust2::Password::empty())
        .map_err(|e| anyhow::anyhow!("Failed to open 7z: {}", e))?;
    let mut summary = ExtractionSummary::default();

    reader
        .for_each_entries(|entry, entry_reader| {
            let entry_name = entry.name().replace('\\', "/");
            let sanitized = match sanitize_path(Path::new(&entry_name)) {
                Some(p) => p,
                None => {
                    summary.skipped += 1;
                    return Ok(true);
                }
            };
            let dest_path = target.join(&sanitized);

            if entry.is_directory() {
                fs::create_dir_all(&dest_path)?;
            } else {
                if let Some(parent) = dest_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut file = fs::File::create(&dest_path)?;
                io::copy(entry_reader, &mut file)?;
                summary.files += 1;
            }
            Ok(true)
        })
        .map_err(|e| anyhow::anyhow!("Failed to extract 7z: {}", e))?;

    Ok(summary)
}
