pub mod catalog;
pub mod cli;
pub mod common;
pub mod config;
pub mod elevation;
pub mod error;
pub mod host;
pub mod logger;
pub mod models;
pub mod reconciler;
pub mod release;
pub mod stager;
pub mod updater;
pub mod version;

#[cfg(test)]
mod test_support;

use clap::Parser;
use std::process::ExitCode;

pub use config::HubConfig;
pub use error::{ErrorCode, HubError, HubResult};
pub use models::{
    ArtifactKind, InstallRecord, InstallRequest, PluginDescriptor, PluginReport, PluginStatus,
    ReleaseInfo, StatusEvent,
};
pub use reconciler::{EventSink, Reconciler};

pub fn run() -> ExitCode {
    let cli = cli::Cli::parse();

    let mut config = HubConfig::from_env();
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }

    if let Err(e) = logger::init(&config.data_dir) {
        eprintln!("Logging disabled: {}", e);
    }
    logger::log_info(
        &format!("vatACARS Hub {} starting", env!("CARGO_PKG_VERSION")),
        Some("app"),
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::execute(cli, config)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            logger::log_error(&format!("Command failed: {:#}", e), Some("app"));
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
