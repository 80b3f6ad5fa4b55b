//! Plugin install reconciler
//!
//! Drives one plugin from a status query to a terminal outcome:
//! process guard, host location, remote release, local record, then the
//! download, staging and privileged placement steps. No error escapes an
//! operation; every failure ends as a terminal [`StatusEvent`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::app_dirs;
use crate::common::settings::{plugin_version_key, SettingsStore};
use crate::config::HubConfig;
use crate::elevation::{self, ElevatedPlan, PrivilegedExecutor};
use crate::error::{HubError, HubResult};
use crate::host::{HostLocator, OperatorPrompt, ProcessProbe, SystemProcessProbe};
use crate::logger;
use crate::models::{
    ArtifactKind, InstallRecord, InstallRequest, PluginDescriptor, PluginReport, PluginStatus,
    StatusEvent,
};
use crate::release::ReleaseClient;
use crate::stager::ArtifactStager;
use crate::version::{self, VersionComparison};

pub mod events;
pub mod local;
pub mod single_flight;

pub use events::{ChannelSink, EventSink, LogSink, NullSink};
pub use local::{derive_record, PluginPaths};
pub use single_flight::SingleFlight;

const LOG_CTX: &str = "reconciler";
pub const REASON_HOST_RUNNING: &str = "host running";
pub const REASON_HOST_UNSET: &str = "host location unset";

/// Reads the file-version resource of a downloaded binary
pub type FileVersionReader = fn(&Path) -> Option<String>;

pub struct Reconciler {
    config: HubConfig,
    settings: Arc<SettingsStore>,
    locator: HostLocator,
    probe: Arc<dyn ProcessProbe>,
    executor: Arc<dyn PrivilegedExecutor>,
    stager: ArtifactStager,
    releases: ReleaseClient,
    events: Arc<dyn EventSink>,
    flights: SingleFlight,
    file_version: FileVersionReader,
}

impl Reconciler {
    pub fn new(
        config: HubConfig,
        settings: Arc<SettingsStore>,
        prompt: Arc<dyn OperatorPrompt>,
        events: Arc<dyn EventSink>,
    ) -> HubResult<Self> {
        let client = crate::common::http::build_http_client(config.http_timeout)?;
        let locator = HostLocator::new(
            settings.clone(),
            config.default_host_paths.clone(),
            config.host_executable.clone(),
            prompt,
        );
        let executor = elevation::build_executor(config.elevation, config.elevation_timeout);
        let stager = ArtifactStager::new(client.clone(), config.staging_dir(), config.payload_policy)
            .with_idle_timeout(config.download_idle_timeout);
        let releases = ReleaseClient::new(client, config.api_base.clone(), config.http_timeout);

        Ok(Self {
            config,
            settings,
            locator,
            probe: Arc::new(SystemProcessProbe),
            executor,
            stager,
            releases,
            events,
            flights: SingleFlight::new(),
            file_version: version::binary::query_file_version,
        })
    }

    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn PrivilegedExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_file_version_reader(mut self, reader: FileVersionReader) -> Self {
        self.file_version = reader;
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.stager =
            ArtifactStager::new(client.clone(), self.config.staging_dir(), self.config.payload_policy)
                .with_idle_timeout(self.config.download_idle_timeout);
        self.releases =
            ReleaseClient::new(client, self.config.api_base.clone(), self.config.http_timeout);
        self
    }

    pub fn locator(&self) -> &HostLocator {
        &self.locator
    }

    pub fn releases(&self) -> &ReleaseClient {
        &self.releases
    }

    fn emit(&self, event: StatusEvent) -> StatusEvent {
        self.events.emit(&event);
        event
    }

    fn plugin_root(&self, host: &Path) -> PathBuf {
        host.join(&self.config.plugin_subdir)
    }

    /// Local record only, without touching the network
    pub async fn local_record(&self, name: &str) -> HubResult<InstallRecord> {
        crate::common::path_utils::validate_plugin_name(name)?;
        let host = self.locator.current().await.ok_or(HubError::HostNotConfigured)?;
        Ok(derive_record(&self.plugin_root(&host), name, &self.settings).await)
    }

    /// Status query: compare the on-disk version with the latest release
    pub async fn check(&self, descriptor: &PluginDescriptor) -> PluginReport {
        let _flight = self.flights.acquire(&descriptor.name).await;
        self.check_locked(descriptor).await
    }

    async fn check_locked(&self, descriptor: &PluginDescriptor) -> PluginReport {
        let name = descriptor.name.as_str();
        self.emit(StatusEvent::new(name, PluginStatus::Checking));

        if let Err(e) = crate::common::path_utils::validate_plugin_name(name) {
            return self.report_unavailable(name, e.to_string());
        }
        if self.probe.is_running(&self.config.host_executable).await {
            self.emit(StatusEvent::new(name, PluginStatus::Running));
            return PluginReport::not_available(name, REASON_HOST_RUNNING);
        }
        let host = match self.locator.resolve().await {
            Some(host) => host,
            None => return self.report_unavailable(name, REASON_HOST_UNSET),
        };

        let release = match self
            .releases
            .latest_plugin_release(&descriptor.source_repository, descriptor.artifact_kind.as_ref())
            .await
        {
            Ok(Some(release)) => release,
            Ok(None) => return self.report_unavailable(name, "no installable asset in latest release"),
            Err(e) => {
                logger::log_error(
                    &format!("Release lookup for {} failed: {}", name, e),
                    Some(LOG_CTX),
                );
                return self.report_unavailable(name, e.to_string());
            }
        };

        let record = derive_record(&self.plugin_root(&host), name, &self.settings).await;
        let remote_version = release.remote_version();

        let status = if !record.installed {
            PluginStatus::NotInstalled
        } else {
            match (&record.installed_version, &remote_version) {
                (Some(local), Some(remote)) => match version::compare(local, remote) {
                    VersionComparison::RemoteNewer => PluginStatus::UpdateAvailable,
                    _ => PluginStatus::UpToDate,
                },
                _ => {
                    logger::log_debug(
                        &format!(
                            "{}: versions not comparable (local {:?}, remote {:?})",
                            name, record.installed_version, remote_version
                        ),
                        Some(LOG_CTX),
                        None,
                    );
                    PluginStatus::UpToDate
                }
            }
        };

        self.emit(
            StatusEvent::new(name, status).with_version(record.installed_version.clone()),
        );
        PluginReport {
            plugin_name: name.to_string(),
            status,
            record,
            remote_version,
            release: Some(release),
            reason: None,
        }
    }

    fn report_unavailable(&self, name: &str, reason: impl Into<String>) -> PluginReport {
        let report = PluginReport::not_available(name, reason);
        let mut event = StatusEvent::new(name, PluginStatus::NotAvailable);
        event.error = report.reason.clone();
        self.emit(event);
        report
    }

    /// Install the given asset, replacing whatever is on disk
    pub async fn install(&self, request: &InstallRequest) -> StatusEvent {
        let _flight = self.flights.acquire(&request.plugin_name).await;
        self.install_locked(request).await
    }

    /// Check, then install when missing or outdated
    pub async fn update(&self, descriptor: &PluginDescriptor) -> StatusEvent {
        let _flight = self.flights.acquire(&descriptor.name).await;
        let report = self.check_locked(descriptor).await;
        let name = descriptor.name.as_str();

        match (report.status, report.release) {
            (PluginStatus::NotInstalled | PluginStatus::UpdateAvailable, Some(release)) => {
                let request = InstallRequest {
                    plugin_name: descriptor.name.clone(),
                    download_url: release.asset_url.clone(),
                    version: Some(release.tag_version.clone()),
                    artifact_kind: release.asset_kind.clone(),
                };
                self.install_locked(&request).await
            }
            (PluginStatus::NotAvailable, _) => {
                let reason = report.reason.unwrap_or_default();
                let status = if reason == REASON_HOST_RUNNING {
                    PluginStatus::Running
                } else {
                    PluginStatus::NotAvailable
                };
                StatusEvent::new(name, status).with_error(reason)
            }
            (status, _) => StatusEvent::new(name, status).with_version(report.record.installed_version),
        }
    }

    async fn install_locked(&self, request: &InstallRequest) -> StatusEvent {
        let name = request.plugin_name.as_str();
        logger::log_info(
            &format!(
                "Installing {} ({}) from {}",
                name,
                request.artifact_kind.label(),
                request.download_url
            ),
            Some(LOG_CTX),
        );

        // Temp directories are owned by try_install and gone once it returns
        let outcome = self.try_install(request).await;
        self.finish(name, outcome, "Installed")
    }

    async fn try_install(&self, request: &InstallRequest) -> HubResult<Option<String>> {
        let name = request.plugin_name.as_str();
        crate::common::path_utils::validate_plugin_name(name)?;
        let root = self.guarded_plugin_root().await?;
        let paths = PluginPaths::new(&root, name);

        self.emit(StatusEvent::progress(name, 0, Some(0.0)));
        let workspace = self.stager.workspace("download-")?;
        let artifact = workspace
            .path()
            .join(format!("{}.{}", name, request.artifact_kind.extension()));
        self.stager
            .download(&request.download_url, &artifact, |bytes, percent| {
                self.events
                    .emit(&StatusEvent::progress(name, bytes, percent));
            })
            .await?;

        self.emit(StatusEvent::new(name, PluginStatus::Installing));

        let replace_all = ElevatedPlan::new(format!("install {}", name))
            .create_dir(&root)
            .remove_dir(&paths.directory)
            .remove_file(&paths.flat_file)
            .remove_file(&paths.sidecar);

        let (plan, _staged) = match &request.artifact_kind {
            ArtifactKind::Archive { format } => {
                let staged = self.stager.stage(&artifact, *format).await?;
                let plan = replace_all
                    .copy_dir(staged.payload_dir(), &paths.directory)
                    .verify_exists(&paths.directory);
                (plan, Some(staged))
            }
            ArtifactKind::File { extension } => {
                let target = paths.flat_file_with_extension(name, extension);
                let mut plan = replace_all.remove_file(&target).copy_file(&artifact, &target);
                if let Some(v) = self.sidecar_version(&artifact, request.version.as_deref()).await {
                    let sidecar = serde_json::json!({ "version": v }).to_string();
                    plan = plan.write_file(&paths.sidecar, sidecar);
                }
                (plan.verify_exists(&target), None)
            }
        };

        let output = self.executor.run(&plan).await?;
        if output.elevated {
            logger::log_info(&format!("{} placed with elevation", name), Some(LOG_CTX));
        }

        // Re-derive from disk only, a stale fallback must not mask a missing sidecar
        self.persist_version(name, None).await;
        let record = derive_record(&root, name, &self.settings).await;
        if !record.installed {
            return Err(HubError::execution_failed(
                format!("{} not found after placement", name),
                output.output,
            ));
        }
        self.persist_version(name, record.installed_version.as_deref()).await;
        self.append_install_log(name, record.installed_version.as_deref());
        Ok(record.installed_version)
    }

    /// Version recorded next to a flat file: the binary's own, else the requested one
    async fn sidecar_version(&self, artifact: &Path, requested: Option<&str>) -> Option<String> {
        let reader = self.file_version;
        let path = artifact.to_path_buf();
        let from_binary = tokio::task::spawn_blocking(move || reader(&path))
            .await
            .ok()
            .flatten();
        from_binary.or_else(|| requested.and_then(version::normalize))
    }

    /// Remove every on-disk trace of the plugin and verify it is gone
    pub async fn uninstall(&self, name: &str) -> StatusEvent {
        let _flight = self.flights.acquire(name).await;
        let outcome = self.try_uninstall(name).await;
        self.finish(name, outcome, "Uninstalled")
    }

    async fn try_uninstall(&self, name: &str) -> HubResult<Option<String>> {
        crate::common::path_utils::validate_plugin_name(name)?;
        let root = self.guarded_plugin_root().await?;
        let paths = PluginPaths::new(&root, name);

        let record = derive_record(&root, name, &self.settings).await;
        if !record.installed {
            logger::log_info(&format!("{} is not installed", name), Some(LOG_CTX));
            return Ok(None);
        }

        self.emit(StatusEvent::new(name, PluginStatus::Uninstalling));
        let mut plan = ElevatedPlan::new(format!("uninstall {}", name))
            .remove_dir(&paths.directory)
            .remove_file(&paths.flat_file)
            .remove_file(&paths.sidecar);
        if let Some(installed) = &record.install_path {
            plan = plan.remove_file(installed).verify_absent(installed);
        }
        for path in paths.all() {
            plan = plan.verify_absent(path);
        }
        self.executor.run(&plan).await?;

        if let Some(left) = paths.all().into_iter().find(|p| p.exists()) {
            return Err(HubError::execution_failed(
                format!("{} still present after uninstall", left.display()),
                "",
            ));
        }

        if let Err(e) = self.settings.remove(&plugin_version_key(name)).await {
            logger::log_error(
                &format!("Failed to clear stored version for {}: {}", name, e),
                Some(LOG_CTX),
            );
        }
        Ok(None)
    }

    /// Process guard and host location, in that order, before any mutation
    async fn guarded_plugin_root(&self) -> HubResult<PathBuf> {
        if self.probe.is_running(&self.config.host_executable).await {
            return Err(HubError::HostBusy {
                process: self.config.host_executable.clone(),
            });
        }
        let host = self
            .locator
            .resolve()
            .await
            .ok_or(HubError::HostNotConfigured)?;
        Ok(self.plugin_root(&host))
    }

    fn finish(&self, name: &str, outcome: HubResult<Option<String>>, verb: &str) -> StatusEvent {
        let event = match outcome {
            Ok(version) => {
                logger::log_info(
                    &format!("{} {} ({})", verb, name, version.as_deref().unwrap_or("unknown")),
                    Some(LOG_CTX),
                );
                StatusEvent::new(name, PluginStatus::Done).with_version(version)
            }
            Err(e @ HubError::HostBusy { .. }) => {
                logger::log_info(&format!("{}: {}", name, e), Some(LOG_CTX));
                StatusEvent::new(name, PluginStatus::Running).with_error(e.to_string())
            }
            Err(HubError::HostNotConfigured) => {
                logger::log_info(&format!("{}: {}", name, REASON_HOST_UNSET), Some(LOG_CTX));
                StatusEvent::new(name, PluginStatus::NotAvailable).with_error(REASON_HOST_UNSET)
            }
            Err(e) => {
                logger::log_error(
                    &format!("{} failed for {} [{}]: {}", verb, name, e.code(), e.diagnostic()),
                    Some(LOG_CTX),
                );
                StatusEvent::failed(name, e.diagnostic())
            }
        };
        self.emit(event)
    }

    async fn persist_version(&self, name: &str, installed_version: Option<&str>) {
        let key = plugin_version_key(name);
        let result = match installed_version {
            Some(v) => self.settings.set(&key, v).await,
            None => self.settings.remove(&key).await,
        };
        if let Err(e) = result {
            logger::log_error(
                &format!("Failed to persist version for {}: {}", name, e),
                Some(LOG_CTX),
            );
        }
    }

    fn append_install_log(&self, name: &str, installed_version: Option<&str>) {
        let path = app_dirs::install_log_path(&self.config.data_dir, name);
        let entry = format_install_log_entry(
            installed_version,
            &chrono::Local::now().to_rfc3339(),
        );

        let result = path
            .parent()
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
            })
            .and_then(|mut file| file.write_all(entry.as_bytes()));

        if let Err(e) = result {
            logger::log_error(
                &format!("Failed to write install log {:?}: {}", path, e),
                Some(LOG_CTX),
            );
        }
    }
}

pub fn format_install_log_entry(installed_version: Option<&str>, timestamp: &str) -> String {
    format!(
        "Installed version: {}\nInstalled at: {}\n",
        installed_version.unwrap_or("unknown"),
        timestamp
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::settings::HOST_LOCATION_KEY;
    use crate::elevation::{ElevationMode, InProcessExecutor};
    use crate::host::NoPrompt;
    use crate::models::ArchiveFormat;
    use crate::stager::PayloadPolicy;
    use crate::test_support::{test_client, MockResponse, MockServer};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;
    use zip::write::SimpleFileOptions;

    struct FakeProbe(AtomicBool);

    #[async_trait]
    impl ProcessProbe for FakeProbe {
        async fn is_running(&self, _process_name: &str) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        plugins: PathBuf,
        data: PathBuf,
        settings: Arc<SettingsStore>,
        probe: Arc<FakeProbe>,
        events: UnboundedReceiver<StatusEvent>,
        server: MockServer,
        reconciler: Reconciler,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let host = dir.path().join("vatSys").join("bin");
            fs::create_dir_all(&host).unwrap();
            let data = dir.path().join("data");
            let server = MockServer::start(vec![]).await;

            let config = HubConfig {
                data_dir: data.clone(),
                api_base: server.base_url(),
                default_host_paths: vec![],
                elevation: ElevationMode::None,
                payload_policy: PayloadPolicy::Strict,
                ..HubConfig::default()
            };
            let settings = Arc::new(SettingsStore::open(config.settings_path()).unwrap());
            settings
                .set(HOST_LOCATION_KEY, host.to_string_lossy().to_string())
                .await
                .unwrap();

            let (sink, events) = ChannelSink::new();
            let probe = Arc::new(FakeProbe(AtomicBool::new(false)));
            let reconciler = Reconciler::new(config, settings.clone(), Arc::new(NoPrompt), Arc::new(sink))
                .unwrap()
                .with_probe(probe.clone())
                .with_executor(Arc::new(InProcessExecutor))
                .with_file_version_reader(|_| None)
                .with_http_client(test_client());

            Self {
                plugins: host.join("Plugins"),
                _dir: dir,
                data,
                settings,
                probe,
                events,
                server,
                reconciler,
            }
        }

        fn serve_zip(&self, path: &str, entries: &[(&str, &str)]) -> String {
            self.server.route(path, MockResponse::ok(zip_bytes(entries)));
            self.server.url(path)
        }

        fn archive_request(&self, name: &str, url: String, version: Option<&str>) -> InstallRequest {
            InstallRequest {
                plugin_name: name.to_string(),
                download_url: url,
                version: version.map(str::to_string),
                artifact_kind: ArtifactKind::Archive {
                    format: ArchiveFormat::Zip,
                },
            }
        }

        fn drain_statuses(&mut self) -> Vec<PluginStatus> {
            let mut statuses = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                statuses.push(event.status);
            }
            statuses
        }

        fn staging_is_empty(&self) -> bool {
            fs::read_dir(app_dirs::staging_dir(&self.data))
                .map(|mut d| d.next().is_none())
                .unwrap_or(true)
        }

        fn publish_release(&self, repo: &str, tag: &str, asset_path: &str) {
            self.server.route(
                &format!("/repos/{}/releases/latest", repo),
                MockResponse::json(serde_json::json!({
                    "tag_name": tag,
                    "name": format!("Release {}", tag),
                    "body": "",
                    "assets": [
                        {"name": "notes.txt", "browser_download_url": self.server.url("/notes.txt")},
                        {"name": "vatACARS.zip", "browser_download_url": self.server.url(asset_path)}
                    ]
                })),
            );
        }
    }

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, contents) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_install_reports_version_from_placed_metadata() {
        let mut h = Harness::new().await;
        let url = h.serve_zip(
            "/vatACARS-1.0.zip",
            &[
                ("vatACARS-1.0/vatACARS.dll", "MZ"),
                ("vatACARS-1.0/version.json", r#"{"version":"1.0.5"}"#),
            ],
        );

        let event = h
            .reconciler
            .install(&h.archive_request("vatACARS", url, Some("v1.0.0")))
            .await;
        assert_eq!(event.status, PluginStatus::Done);
        assert_eq!(event.version.as_deref(), Some("1.0.5"));

        let record = h.reconciler.local_record("vatACARS").await.unwrap();
        assert!(record.installed);
        assert_eq!(record.installed_version.as_deref(), Some("1.0.5"));
        assert!(h.plugins.join("vatACARS").join("vatACARS.dll").is_file());
        assert_eq!(
            h.settings.get_string(&plugin_version_key("vatACARS")).await.as_deref(),
            Some("1.0.5")
        );

        let log = fs::read_to_string(app_dirs::install_log_path(&h.data, "vatACARS")).unwrap();
        assert!(log.starts_with("Installed version: 1.0.5\nInstalled at: "));
        assert!(h.staging_is_empty());

        let statuses = h.drain_statuses();
        assert!(statuses.contains(&PluginStatus::Downloading));
        assert!(statuses.contains(&PluginStatus::Installing));
        assert_eq!(statuses.last(), Some(&PluginStatus::Done));
    }

    #[tokio::test]
    async fn test_reinstall_is_a_clean_replacement() {
        let h = Harness::new().await;
        let first = h.serve_zip(
            "/a.zip",
            &[
                ("vatACARS.dll", "MZ"),
                ("extra.xml", "<old/>"),
                ("version.json", r#"{"version":"1.0.0"}"#),
            ],
        );
        let second = h.serve_zip(
            "/b.zip",
            &[
                ("vatACARS.dll", "MZ2"),
                ("version.json", r#"{"Major":1,"Minor":1}"#),
            ],
        );

        h.reconciler
            .install(&h.archive_request("vatACARS", first, None))
            .await;
        let event = h
            .reconciler
            .install(&h.archive_request("vatACARS", second, Some("v1.1.0")))
            .await;

        assert_eq!(event.status, PluginStatus::Done);
        assert_eq!(event.version.as_deref(), Some("1.1.0"));
        assert!(!h.plugins.join("vatACARS").join("extra.xml").exists());

        let log = fs::read_to_string(app_dirs::install_log_path(&h.data, "vatACARS")).unwrap();
        assert_eq!(log.matches("Installed version: ").count(), 2);
    }

    #[tokio::test]
    async fn test_flat_file_install_writes_sidecar_and_switching_layout_removes_it() {
        let h = Harness::new().await;
        h.server.route("/VatpacPlugin.dll", MockResponse::ok(b"MZ".to_vec()));
        let request = InstallRequest {
            plugin_name: "VatpacPlugin".into(),
            download_url: h.server.url("/VatpacPlugin.dll"),
            version: Some("v2.0".into()),
            artifact_kind: ArtifactKind::File {
                extension: "dll".into(),
            },
        };

        let event = h.reconciler.install(&request).await;
        assert_eq!(event.status, PluginStatus::Done);
        assert_eq!(event.version.as_deref(), Some("2.0.0"));
        assert!(h.plugins.join("VatpacPlugin.dll").is_file());
        let sidecar = fs::read_to_string(h.plugins.join("VatpacPlugin.version.json")).unwrap();
        assert_eq!(sidecar, r#"{"version":"2.0.0"}"#);

        let url = h.serve_zip(
            "/VatpacPlugin.zip",
            &[
                ("VatpacPlugin.dll", "MZ"),
                ("version.json", r#""2.1.0""#),
            ],
        );
        let event = h
            .reconciler
            .install(&h.archive_request("VatpacPlugin", url, None))
            .await;
        assert_eq!(event.status, PluginStatus::Done);
        assert!(!h.plugins.join("VatpacPlugin.dll").exists());
        assert!(!h.plugins.join("VatpacPlugin.version.json").exists());
        assert!(h.plugins.join("VatpacPlugin").is_dir());
    }

    #[tokio::test]
    async fn test_flat_file_sidecar_prefers_binary_file_version() {
        let mut h = Harness::new().await;
        h.reconciler = h
            .reconciler
            .with_file_version_reader(|_| Some("3.1.4".to_string()));
        h.server.route("/AirportsPlugin.dll", MockResponse::ok(b"MZ".to_vec()));

        let event = h
            .reconciler
            .install(&InstallRequest {
                plugin_name: "AirportsPlugin".into(),
                download_url: h.server.url("/AirportsPlugin.dll"),
                version: Some("v2.0.0".into()),
                artifact_kind: ArtifactKind::File {
                    extension: "dll".into(),
                },
            })
            .await;

        assert_eq!(event.status, PluginStatus::Done);
        assert_eq!(event.version.as_deref(), Some("3.1.4"));
        let sidecar = fs::read_to_string(h.plugins.join("AirportsPlugin.version.json")).unwrap();
        assert_eq!(sidecar, r#"{"version":"3.1.4"}"#);
    }

    #[tokio::test]
    async fn test_flat_file_without_version_drops_stale_sidecar() {
        let h = Harness::new().await;
        fs::create_dir_all(&h.plugins).unwrap();
        fs::write(h.plugins.join("DiscordPlugin.version.json"), r#""0.9.0""#).unwrap();
        h.settings
            .set(&plugin_version_key("DiscordPlugin"), "0.9.0")
            .await
            .unwrap();
        h.server.route("/DiscordPlugin.dll", MockResponse::ok(b"MZ".to_vec()));

        let event = h
            .reconciler
            .install(&InstallRequest {
                plugin_name: "DiscordPlugin".into(),
                download_url: h.server.url("/DiscordPlugin.dll"),
                version: Some("latest".into()),
                artifact_kind: ArtifactKind::File {
                    extension: "dll".into(),
                },
            })
            .await;

        assert_eq!(event.status, PluginStatus::Done);
        assert!(!h.plugins.join("DiscordPlugin.version.json").exists());
        if cfg!(not(target_os = "windows")) {
            assert_eq!(event.version, None);
            let log =
                fs::read_to_string(app_dirs::install_log_path(&h.data, "DiscordPlugin")).unwrap();
            assert!(log.starts_with("Installed version: unknown\n"));
        }
    }

    #[tokio::test]
    async fn test_running_host_blocks_without_touching_disk() {
        let mut h = Harness::new().await;
        h.probe.0.store(true, Ordering::SeqCst);
        let url = h.serve_zip("/a.zip", &[("vatACARS.dll", "MZ"), ("version.json", "\"1.0.0\"")]);

        let event = h
            .reconciler
            .install(&h.archive_request("vatACARS", url, None))
            .await;
        assert_eq!(event.status, PluginStatus::Running);
        let event = h.reconciler.uninstall("OzStrips").await;
        assert_eq!(event.status, PluginStatus::Running);

        assert!(!h.plugins.exists());
        assert!(!app_dirs::staging_dir(&h.data).exists());
        assert!(!h.drain_statuses().contains(&PluginStatus::Downloading));
    }

    #[tokio::test]
    async fn test_uninstall_verifies_removal_and_clears_fallback() {
        let h = Harness::new().await;
        let url = h.serve_zip(
            "/oz.zip",
            &[("OzStrips.dll", "MZ"), ("version.json", r#"{"version":"0.5.2"}"#)],
        );
        h.reconciler
            .install(&h.archive_request("OzStrips", url, None))
            .await;
        assert!(h.plugins.join("OzStrips").is_dir());

        let event = h.reconciler.uninstall("OzStrips").await;
        assert_eq!(event.status, PluginStatus::Done);
        assert!(!h.plugins.join("OzStrips").exists());
        assert_eq!(h.settings.get(&plugin_version_key("OzStrips")).await, None);

        let again = h.reconciler.uninstall("OzStrips").await;
        assert_eq!(again.status, PluginStatus::Done);
    }

    #[tokio::test]
    async fn test_check_then_update_cycle() {
        let h = Harness::new().await;
        let descriptor = PluginDescriptor::new("vatACARS", "vatacars/vatsys-plugin");
        h.serve_zip(
            "/v1.2.0.zip",
            &[
                ("vatACARS/vatACARS.dll", "MZ"),
                ("vatACARS/version.json", r#"{"Major":1,"Minor":2,"Patch":0}"#),
            ],
        );
        h.publish_release("vatacars/vatsys-plugin", "v1.2.0", "/v1.2.0.zip");

        let report = h.reconciler.check(&descriptor).await;
        assert_eq!(report.status, PluginStatus::NotInstalled);
        assert_eq!(report.remote_version.as_deref(), Some("1.2.0"));
        assert_eq!(report.release.as_ref().unwrap().asset_name, "vatACARS.zip");

        let old = h.serve_zip(
            "/v1.0.zip",
            &[("vatACARS.dll", "MZ"), ("version.json", r#""1.0""#)],
        );
        h.reconciler
            .install(&h.archive_request("vatACARS", old, None))
            .await;
        let report = h.reconciler.check(&descriptor).await;
        assert_eq!(report.status, PluginStatus::UpdateAvailable);
        assert_eq!(report.record.installed_version.as_deref(), Some("1.0.0"));

        let event = h.reconciler.update(&descriptor).await;
        assert_eq!(event.status, PluginStatus::Done);
        assert_eq!(event.version.as_deref(), Some("1.2.0"));

        let event = h.reconciler.update(&descriptor).await;
        assert_eq!(event.status, PluginStatus::UpToDate);
    }

    #[tokio::test]
    async fn test_unparseable_remote_never_reports_update() {
        let h = Harness::new().await;
        let url = h.serve_zip("/a.zip", &[("vatACARS.dll", "MZ"), ("version.json", "\"1.0.0\"")]);
        h.reconciler
            .install(&h.archive_request("vatACARS", url, None))
            .await;
        h.publish_release("vatacars/vatsys-plugin", "nightly", "/a.zip");

        let report = h
            .reconciler
            .check(&PluginDescriptor::new("vatACARS", "vatacars/vatsys-plugin"))
            .await;
        assert_eq!(report.remote_version.as_deref(), None);
        assert_eq!(report.status, PluginStatus::UpToDate);
    }

    #[tokio::test]
    async fn test_unset_host_is_not_available() {
        let h = Harness::new().await;
        h.settings.remove(HOST_LOCATION_KEY).await.unwrap();

        let report = h
            .reconciler
            .check(&PluginDescriptor::new("OzStrips", "maxrumsey/OzStrips"))
            .await;
        assert_eq!(report.status, PluginStatus::NotAvailable);
        assert_eq!(report.reason.as_deref(), Some(REASON_HOST_UNSET));

        let url = h.serve_zip("/a.zip", &[("OzStrips.dll", "MZ")]);
        let event = h
            .reconciler
            .install(&h.archive_request("OzStrips", url, None))
            .await;
        assert_eq!(event.status, PluginStatus::NotAvailable);
        assert_eq!(event.error.as_deref(), Some(REASON_HOST_UNSET));

        let event = h.reconciler.uninstall("OzStrips").await;
        assert_eq!(event.status, PluginStatus::NotAvailable);
        assert_eq!(event.error.as_deref(), Some(REASON_HOST_UNSET));
        assert!(h.staging_is_empty());
    }

    #[tokio::test]
    async fn test_release_lookup_failure_is_not_available() {
        let h = Harness::new().await;
        let report = h
            .reconciler
            .check(&PluginDescriptor::new("EventsPlugin", "badvectors/EventsPlugin"))
            .await;
        assert_eq!(report.status, PluginStatus::NotAvailable);
        assert!(report.reason.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_malformed_archive_keeps_existing_install() {
        let h = Harness::new().await;
        let good = h.serve_zip(
            "/good.zip",
            &[("vatACARS.dll", "MZ"), ("version.json", "\"1.0.0\"")],
        );
        h.reconciler
            .install(&h.archive_request("vatACARS", good, None))
            .await;

        let bad = h.serve_zip("/bad.zip", &[("wrapper/README.md", "hi")]);
        let event = h
            .reconciler
            .install(&h.archive_request("vatACARS", bad, None))
            .await;
        assert_eq!(event.status, PluginStatus::Failed);
        assert!(event.error.unwrap().contains("malformed archive"));
        assert!(h.plugins.join("vatACARS").join("vatACARS.dll").is_file());
        assert!(h.staging_is_empty());
    }

    struct DenyingExecutor;

    #[async_trait]
    impl PrivilegedExecutor for DenyingExecutor {
        async fn run(&self, _plan: &ElevatedPlan) -> HubResult<crate::elevation::ExecOutput> {
            Err(HubError::ElevationDenied("canceled by the user".to_string()))
        }
    }

    #[tokio::test]
    async fn test_denied_elevation_fails_and_cleans_staging() {
        let mut h = Harness::new().await;
        h.reconciler = h.reconciler.with_executor(Arc::new(DenyingExecutor));
        let url = h.serve_zip(
            "/vatACARS.zip",
            &[("vatACARS.dll", "MZ"), ("version.json", "\"1.3.0\"")],
        );

        let event = h
            .reconciler
            .install(&h.archive_request("vatACARS", url, Some("v1.3.0")))
            .await;
        assert_eq!(event.status, PluginStatus::Failed);
        assert!(event.error.unwrap().contains("canceled by the user"));
        assert!(h.staging_is_empty());
        assert!(!app_dirs::install_log_path(&h.data, "vatACARS").exists());
        assert_eq!(h.settings.get(&plugin_version_key("vatACARS")).await, None);
        assert_eq!(h.drain_statuses().last(), Some(&PluginStatus::Failed));
    }

    #[tokio::test]
    async fn test_download_failure_and_invalid_name() {
        let h = Harness::new().await;
        let event = h
            .reconciler
            .install(&h.archive_request("vatACARS", h.server.url("/gone.zip"), None))
            .await;
        assert_eq!(event.status, PluginStatus::Failed);
        assert!(event.error.unwrap().contains("404"));
        assert!(h.staging_is_empty());

        let url = h.serve_zip("/a.zip", &[("x.dll", "MZ")]);
        let event = h
            .reconciler
            .install(&h.archive_request("../escape", url, None))
            .await;
        assert_eq!(event.status, PluginStatus::Failed);
        assert!(!h.plugins.exists());
    }

    #[tokio::test]
    async fn test_concurrent_installs_on_one_plugin_both_complete() {
        let h = Harness::new().await;
        let a = h.serve_zip("/a.zip", &[("vatACARS.dll", "MZ"), ("version.json", "\"1.0.0\"")]);
        let b = h.serve_zip("/b.zip", &[("vatACARS.dll", "MZ"), ("version.json", "\"1.1.0\"")]);
        let first = h.archive_request("vatACARS", a, None);
        let second = h.archive_request("vatACARS", b, None);

        let (x, y) = tokio::join!(h.reconciler.install(&first), h.reconciler.install(&second));
        assert_eq!(x.status, PluginStatus::Done);
        assert_eq!(y.status, PluginStatus::Done);

        let log = fs::read_to_string(app_dirs::install_log_path(&h.data, "vatACARS")).unwrap();
        assert_eq!(log.matches("Installed version: ").count(), 2);
        let record = h.reconciler.local_record("vatACARS").await.unwrap();
        assert!(matches!(record.installed_version.as_deref(), Some("1.0.0") | Some("1.1.0")));
    }

    #[test]
    fn test_install_log_entry_format() {
        assert_eq!(
            format_install_log_entry(Some("1.2.3"), "2024-05-01T10:00:00+10:00"),
            "Installed version: 1.2.3\nInstalled at: 2024-05-01T10:00:00+10:00\n"
        );
        assert!(format_install_log_entry(None, "t").starts_with("Installed version: unknown\n"));
    }
}
