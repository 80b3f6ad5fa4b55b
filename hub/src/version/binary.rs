//! File-version resource of a plugin binary
//!
//! Only Windows binaries carry one, and it is read through PowerShell rather
//! than the Win32 version API. The answer is accepted only when it is strictly
//! `N.N.N` or `N.N.N.N`; the fourth (build) component is dropped.

use std::path::Path;

pub fn query_file_version(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    let output = run_version_query(path)?;
    parse_file_version_output(&output)
}

#[cfg(target_os = "windows")]
fn run_version_query(path: &Path) -> Option<String> {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;

    let literal = crate::elevation::script::quote_powershell(&path.to_string_lossy());
    let command = format!(
        "(Get-Item -LiteralPath {}).VersionInfo.FileVersion",
        literal
    );

    match std::process::Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", &command])
        .creation_flags(CREATE_NO_WINDOW)
        .output()
    {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(output) => {
            crate::logger::log_debug(
                &format!(
                    "File version query failed for {:?}: {}",
                    path,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                Some("version"),
                None,
            );
            None
        }
        Err(e) => {
            crate::logger::log_debug(
                &format!("Failed to run powershell: {}", e),
                Some("version"),
                None,
            );
            None
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn run_version_query(_path: &Path) -> Option<String> {
    None
}

/// Strictly validate the raw query output
pub fn parse_file_version_output(output: &str) -> Option<String> {
    let trimmed = output.trim();
    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let mut numbers = Vec::with_capacity(parts.len());
    for part in &parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        numbers.push(part.parse::<u64>().ok()?);
    }
    Some(format!("{}.{}.{}", numbers[0], numbers[1], numbers[2]))
}
