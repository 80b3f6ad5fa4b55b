//! Command-line shell over the reconciler

use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog;
use crate::common::settings::SettingsStore;
use crate::config::{HubConfig, HUB_REPOSITORY};
use crate::error::HubError;
use crate::host::{NoPrompt, OperatorPrompt};
use crate::logger;
use crate::models::{
    ArtifactKind, InstallRequest, PluginDescriptor, PluginReport, PluginStatus, StatusEvent,
};
use crate::reconciler::{EventSink, Reconciler};
use crate::updater::UpdateChecker;

/// Install, update and remove vatSys plugins
#[derive(Parser, Debug)]
#[command(name = "vatacars-hub")]
#[command(version)]
pub struct Cli {
    /// Print replies as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Never ask for the vatSys location interactively
    #[arg(long, global = true)]
    pub no_prompt: bool,

    /// Override the data directory (settings, logs, staging)
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List known plugins with their local and remote versions
    List,
    /// Compare one plugin with its latest release
    Status(PluginArgs),
    /// Install the latest release of a plugin, or a given asset URL
    Install(InstallArgs),
    /// Install only when a newer release exists
    Update(PluginArgs),
    /// Remove every installed layout of a plugin
    Uninstall {
        name: String,
    },
    /// Show or set the vatSys location
    Host {
        /// Directory holding vatSys.exe
        #[arg(long, value_name = "DIR")]
        set: Option<PathBuf>,
    },
    /// Check whether a newer hub release exists
    SelfCheck {
        /// Ignore the once-a-day cache
        #[arg(long)]
        force: bool,
    },
    /// Print the tail of the current log file
    Logs {
        #[arg(long, default_value_t = 50)]
        lines: usize,
    },
}

#[derive(Args, Debug)]
pub struct PluginArgs {
    pub name: String,
    /// `owner/repo` for plugins outside the built-in catalog
    #[arg(long, value_name = "OWNER/REPO")]
    pub repo: Option<String>,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    #[command(flatten)]
    pub plugin: PluginArgs,
    /// Install this asset instead of the latest release
    #[arg(long)]
    pub url: Option<String>,
    /// Version recorded for a `--url` install
    #[arg(long = "as-version", value_name = "VERSION")]
    pub version: Option<String>,
}

/// Reads the host location from stdin
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn pick_host_executable(&self, executable_name: &str) -> Option<PathBuf> {
        eprint!(
            "{} was not found. Enter its full path (blank to cancel): ",
            executable_name
        );
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        let trimmed = line.trim().trim_matches('"');
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}

/// Prints in-flight progress to stderr; terminal replies are printed by the command
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: &StatusEvent) {
        if event.status.is_terminal() || event.status == PluginStatus::Checking {
            return;
        }
        match (event.status, event.percent) {
            (PluginStatus::Downloading, Some(percent)) => {
                eprint!("\r{}: downloading {:5.1}%", event.plugin_name, percent);
            }
            (PluginStatus::Downloading, None) => {
                eprint!(
                    "\r{}: downloading {} bytes",
                    event.plugin_name,
                    event.bytes.unwrap_or(0)
                );
            }
            (status, _) => eprintln!("\n{}: {:?}", event.plugin_name, status),
        }
        let _ = std::io::stderr().flush();
    }
}

fn descriptor_for(args: &PluginArgs) -> Result<PluginDescriptor, String> {
    if let Some(repo) = &args.repo {
        return Ok(PluginDescriptor::new(args.name.clone(), repo.clone()));
    }
    catalog::find(&args.name)
        .map(|entry| entry.descriptor())
        .ok_or_else(|| format!("Unknown plugin '{}'; pass --repo owner/repo", args.name))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to encode reply: {}", e),
    }
}

fn print_report(report: &PluginReport, json: bool) {
    if json {
        print_json(report);
        return;
    }
    let local = report
        .record
        .installed_version
        .as_deref()
        .unwrap_or(if report.record.installed { "unknown" } else { "-" });
    let remote = report.remote_version.as_deref().unwrap_or("-");
    let mut line = format!(
        "{:<16} {:<18} local {:<10} latest {:<10}",
        report.plugin_name,
        format!("{:?}", report.status),
        local,
        remote
    );
    if let Some(reason) = &report.reason {
        line.push_str(&format!(" ({})", reason));
    }
    println!("{}", line.trim_end());
}

fn print_event(event: &StatusEvent, json: bool) {
    if json {
        print_json(event);
        return;
    }
    match (&event.error, &event.version) {
        (Some(error), _) => println!("{}: {:?}: {}", event.plugin_name, event.status, error),
        (None, Some(version)) => println!("{}: {:?} ({})", event.plugin_name, event.status, version),
        (None, None) => println!("{}: {:?}", event.plugin_name, event.status),
    }
}

fn event_succeeded(event: &StatusEvent) -> bool {
    event.status == PluginStatus::Done
}

/// Dispatch one parsed command; returns false when it should exit non-zero
pub async fn execute(cli: Cli, config: HubConfig) -> anyhow::Result<bool> {
    if let Command::Logs { lines } = &cli.command {
        for line in logger::get_recent_logs(*lines) {
            println!("{}", line);
        }
        return Ok(true);
    }

    let settings = Arc::new(SettingsStore::open(config.settings_path())?);
    let prompt: Arc<dyn OperatorPrompt> = if cli.no_prompt {
        Arc::new(NoPrompt)
    } else {
        Arc::new(StdinPrompt)
    };
    let reconciler = Reconciler::new(config, settings.clone(), prompt, Arc::new(ConsoleSink))?;
    let json = cli.json;

    match cli.command {
        Command::List => {
            let mut ok = true;
            for entry in catalog::CATALOG {
                let report = reconciler.check(&entry.descriptor()).await;
                ok &= report.status != PluginStatus::NotAvailable;
                print_report(&report, json);
            }
            Ok(ok)
        }
        Command::Status(args) => {
            let descriptor = descriptor_for(&args).map_err(anyhow::Error::msg)?;
            let report = reconciler.check(&descriptor).await;
            print_report(&report, json);
            Ok(report.status != PluginStatus::NotAvailable)
        }
        Command::Install(args) => {
            let event = match args.url {
                Some(url) => {
                    let kind = ArtifactKind::from_asset_name(&url).ok_or_else(|| {
                        anyhow::anyhow!("Cannot tell the artifact kind of {}", url)
                    })?;
                    let request = InstallRequest {
                        plugin_name: args.plugin.name.clone(),
                        download_url: url,
                        version: args.version,
                        artifact_kind: kind,
                    };
                    reconciler.install(&request).await
                }
                None => {
                    let descriptor = descriptor_for(&args.plugin).map_err(anyhow::Error::msg)?;
                    let report = reconciler.check(&descriptor).await;
                    match report.release {
                        Some(release) => {
                            let request = InstallRequest {
                                plugin_name: descriptor.name.clone(),
                                download_url: release.asset_url,
                                version: Some(release.tag_version),
                                artifact_kind: release.asset_kind,
                            };
                            reconciler.install(&request).await
                        }
                        None => {
                            print_report(&report, json);
                            return Ok(false);
                        }
                    }
                }
            };
            print_event(&event, json);
            Ok(event_succeeded(&event))
        }
        Command::Update(args) => {
            let descriptor = descriptor_for(&args).map_err(anyhow::Error::msg)?;
            let event = reconciler.update(&descriptor).await;
            print_event(&event, json);
            Ok(matches!(event.status, PluginStatus::Done | PluginStatus::UpToDate))
        }
        Command::Uninstall { name } => {
            let event = reconciler.uninstall(&name).await;
            print_event(&event, json);
            Ok(event_succeeded(&event))
        }
        Command::Host { set } => {
            if let Some(dir) = set {
                reconciler.locator().set(&dir).await?;
            }
            match reconciler.locator().resolve().await {
                Some(dir) => {
                    println!("{}", dir.display());
                    Ok(true)
                }
                None => {
                    eprintln!("{}", HubError::HostNotConfigured);
                    Ok(false)
                }
            }
        }
        Command::SelfCheck { force } => {
            let checker = UpdateChecker::new(reconciler.releases(), settings, HUB_REPOSITORY);
            match checker.check_for_updates(force).await? {
                Some(info) if json => print_json(&info),
                Some(info) if info.is_update_available => println!(
                    "Update available: {} -> {}\n{}",
                    info.current_version, info.latest_version, info.release_url
                ),
                Some(info) => println!("vatACARS Hub {} is up to date", info.current_version),
                None => println!("Checked recently; pass --force to check again"),
            }
            Ok(true)
        }
        Command::Logs { .. } => Ok(true),
    }
}
