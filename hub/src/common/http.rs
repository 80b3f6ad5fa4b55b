use std::time::Duration;

use crate::error::{HubError, HubResult};

pub const USER_AGENT: &str = concat!("vatACARS-Hub/", env!("CARGO_PKG_VERSION"));

/// Shared client for release lookups and asset downloads
///
/// Only connecting is bounded here; asset bodies may legitimately take
/// longer than any fixed request timeout. API calls set their own.
pub fn build_http_client(connect_timeout: Duration) -> HubResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| HubError::Network(format!("failed to build HTTP client: {}", e)))
}
