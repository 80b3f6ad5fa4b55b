use async_trait::async_trait;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use crate::logger;

/// Answers whether a named process is currently running
///
/// Best effort: a missed process is an accepted risk, while a false positive
/// only blocks an operation that could have proceeded.
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    async fn is_running(&self, process_name: &str) -> bool;
}

/// Process listing through the platform's own tooling
pub struct SystemProcessProbe;

#[async_trait]
impl ProcessProbe for SystemProcessProbe {
    async fn is_running(&self, process_name: &str) -> bool {
        let name = process_name.to_string();

        // Run the listing in a blocking task to avoid blocking the async runtime
        let result = tokio::task::spawn_blocking(move || list_processes(&name)).await;

        match result {
            Ok(Ok(listing)) => {
                let is_running = listing_contains(&listing, process_name);
                logger::log_debug(
                    &format!("{} running check: {}", process_name, is_running),
                    Some("process_guard"),
                    None,
                );
                is_running
            }
            Ok(Err(e)) => {
                logger::log_debug(
                    &format!("Failed to list processes: {}", e),
                    Some("process_guard"),
                    None,
                );
                false
            }
            Err(e) => {
                logger::log_debug(
                    &format!("Task join error: {}", e),
                    Some("process_guard"),
                    None,
                );
                false
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn list_processes(process_name: &str) -> std::io::Result<String> {
    const CREATE_NO_WINDOW: u32 = 0x08000000;

    let filter = format!("IMAGENAME eq {}", process_name);
    let output = std::process::Command::new("tasklist")
        .args(["/FI", &filter, "/NH"])
        .creation_flags(CREATE_NO_WINDOW)
        .output()?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(not(target_os = "windows"))]
fn list_processes(_process_name: &str) -> std::io::Result<String> {
    let output = std::process::Command::new("ps")
        .args(["-A", "-o", "comm="])
        .output()?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Case-insensitive substring match on the raw listing
pub fn listing_contains(listing: &str, process_name: &str) -> bool {
    let needle = process_name.trim().to_lowercase();
    !needle.is_empty() && listing.to_lowercase().contains(&needle)
}
