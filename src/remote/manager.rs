//! Polling reconciliation against the remote authority.
//!
//! # Responsibilities
//! - Materialize sections: local file first, then a one-off blocking fetch,
//!   then defaults
//! - Periodically ask the authority which materialized sections are stale
//! - Download stale sections concurrently, check them, install them
//!   atomically and hand them to the debounced reload path
//!
//! # Design Decisions
//! - Only one poll cycle runs at a time; an overlapping trigger is dropped
//! - The timer is re-armed after a cycle ends, so a slow authority slows
//!   polling down instead of stacking cycles
//! - A section with a reload still pending is left out of the cycle
//! - Network failures are logged and retried on the next tick; values in
//!   force stay in force

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashSet;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::document::DocumentVersion;
use crate::config::entry::ConfigEntry;
use crate::config::error::{ConfigError, ConfigResult};
use crate::config::local::LocalStore;
use crate::config::registry::{section_key, ConfigRegistry, SectionChanged, SectionDocument, SectionSource};
use crate::config::section::{ConfigSection, Section};
use crate::observability::metrics;
use crate::remote::download;
use crate::remote::environment;
use crate::remote::protocol::{RemoteSectionCollection, RemoteSectionParam};
use crate::remote::settings::{self, RemoteSettings, BOOTSTRAP_FILE};
use crate::resilience::backoff::poll_delay;
use crate::watch::FileWatcher;

/// HTTP client and the connect timeout it was built with.
struct HttpClient {
    inner: reqwest::Client,
    connect_timeout: Duration,
}

impl HttpClient {
    fn build(settings: &RemoteSettings) -> ConfigResult<Self> {
        let inner = reqwest::Client::builder()
            .connect_timeout(settings.timeout())
            .user_agent(concat!("remote-config/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            inner,
            connect_timeout: settings.timeout(),
        })
    }
}

/// Backend that falls back to the authority when no local file exists.
pub struct RemoteSource {
    local: Arc<LocalStore>,
    /// Rebuilt when a settings reload changes the connect timeout.
    client: Arc<ArcSwap<HttpClient>>,
    settings: Arc<ArcSwap<RemoteSettings>>,
    machine_name: String,
}

impl RemoteSource {
    fn new(local: Arc<LocalStore>, settings: Arc<ArcSwap<RemoteSettings>>) -> ConfigResult<Self> {
        let client = HttpClient::build(&settings.load())?;

        Ok(Self {
            local,
            client: Arc::new(ArcSwap::from_pointee(client)),
            settings,
            machine_name: environment::machine_name(),
        })
    }

    /// Connect timeout of the client currently in use.
    pub fn connect_timeout(&self) -> Duration {
        self.client.load().connect_timeout
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    pub fn settings(&self) -> Arc<RemoteSettings> {
        self.settings.load_full()
    }

    /// POST the held versions; return the sections the authority has newer.
    pub async fn query(&self, sections: Vec<RemoteSectionParam>) -> ConfigResult<RemoteSectionCollection> {
        let settings = self.settings.load_full();
        let url = &settings.remote_configuration_url;
        let request = RemoteSectionCollection::new(&self.machine_name, &settings.application_name)
            .with_sections(sections);

        let client = self.client.load_full();
        let response = client
            .inner
            .post(url)
            .timeout(settings.read_write_timeout())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// Fetch `update`, check it against the entry's type and install it.
    ///
    /// Nothing on disk changes unless the checker accepts the payload.
    pub async fn download(&self, entry: &ConfigEntry, update: &RemoteSectionParam) -> ConfigResult<PathBuf> {
        let url = update.download_url.as_deref().ok_or_else(|| {
            ConfigError::InvalidArgument(format!("no download URL for section '{}'", update.section_name))
        })?;
        let settings = self.settings.load_full();

        let client = self.client.load_full();
        let response = client
            .inner
            .get(url)
            .timeout(settings.read_write_timeout())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        let text = std::str::from_utf8(&bytes).map_err(|e| {
            ConfigError::InvalidArgument(format!("section '{}' is not UTF-8: {e}", entry.name()))
        })?;
        let version = entry.check(text)?;
        if version != update.version() {
            tracing::warn!(
                section = %entry.name(),
                announced = %update.version(),
                downloaded = %version,
                "Downloaded version differs from the announced one"
            );
        }
        let held = entry.version();
        if version.major != held.major || version.minor <= held.minor {
            return Err(ConfigError::Outdated {
                section: entry.name().to_string(),
                held,
                offered: version,
            });
        }

        let target = self.local.section_path(entry.name());
        let policy = settings.backup_policy();
        let staged_target = target.clone();
        let backup = tokio::task::spawn_blocking(move || download::install(&staged_target, &bytes, policy))
            .await
            .map_err(|e| ConfigError::Runtime(e.to_string()))??;

        tracing::info!(
            section = %entry.name(),
            version = %version,
            path = %target.display(),
            backup = ?backup,
            "Section downloaded"
        );
        Ok(target)
    }

    /// Ask the authority for a section that has no local file yet, and
    /// install it if the authority has one.
    async fn fetch_initial(&self, entry: &ConfigEntry) -> ConfigResult<bool> {
        let request = RemoteSectionParam::request(
            entry.name(),
            DocumentVersion::new(entry.major_version(), -1),
        );
        let response = self.query(vec![request]).await?;

        match response.find(entry.name()) {
            Some(update) if update.major_version == entry.major_version() => {
                self.download(entry, update).await?;
                Ok(true)
            }
            Some(update) => Err(ConfigError::VersionMismatch {
                section: entry.name().to_string(),
                expected: entry.major_version(),
                actual: update.major_version,
            }),
            None => Ok(false),
        }
    }
}

impl SectionSource for RemoteSource {
    async fn on_create(&self, entry: &Arc<ConfigEntry>) -> ConfigResult<Option<SectionDocument>> {
        if let Some(doc) = self.local.load(entry).await? {
            return Ok(Some(doc));
        }
        if !self.settings.load().check_remote_config {
            return Ok(None);
        }

        match self.fetch_initial(entry).await {
            Ok(true) => self.local.load(entry).await,
            Ok(false) => {
                tracing::info!(section = %entry.name(), "Authority has no document for section");
                Ok(None)
            }
            Err(e @ ConfigError::VersionMismatch { .. }) => Err(e),
            Err(e) => {
                tracing::error!(section = %entry.name(), error = %e, "Initial fetch failed, using defaults");
                Ok(None)
            }
        }
    }

    fn changes(&self) -> &broadcast::Sender<SectionChanged> {
        self.local.changes()
    }
}

/// Result of one poll trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// `check_remote_config` is off.
    Disabled,
    /// Nothing is materialized yet.
    Idle,
    /// Another cycle was still running.
    Skipped,
    /// The authority could not be queried.
    Failed,
    /// The cycle ran; `scheduled` downloads were started.
    Completed { scheduled: usize },
}

/// Registry whose sections are kept in sync with the remote authority.
pub struct RemoteConfigManager {
    registry: ConfigRegistry<RemoteSource>,
    settings: Arc<ArcSwap<RemoteSettings>>,
    watcher: Arc<FileWatcher>,
    polling: AtomicBool,
    /// Section keys with a download task running.
    downloading: DashSet<String>,
}

/// Clears the reentrancy flag when a cycle ends, however it ends.
struct PollGuard<'a>(&'a AtomicBool);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Releases a section's download slot when its task ends.
struct DownloadGuard<'a> {
    downloading: &'a DashSet<String>,
    key: String,
}

impl Drop for DownloadGuard<'_> {
    fn drop(&mut self) {
        self.downloading.remove(&self.key);
    }
}

impl RemoteConfigManager {
    /// Bootstrap from `<root>/RemoteConfigurationManager.config` (created
    /// with defaults if missing) and watch that file for changes.
    pub fn start(root: impl Into<PathBuf>, watcher: Arc<FileWatcher>) -> ConfigResult<Arc<Self>> {
        let root = root.into();
        let (settings, version) = settings::load_or_create(&root)?;
        tracing::info!(
            root = %root.display(),
            application = %settings.application_name,
            url = %settings.remote_configuration_url,
            version = %version,
            "Remote configuration settings loaded"
        );

        let manager = Self::with_settings(&root, settings, watcher)?;
        manager.watch_settings(&root.join(BOOTSTRAP_FILE))?;
        Ok(manager)
    }

    /// Build a manager from explicit settings, without a bootstrap file.
    pub fn with_settings(
        root: &Path,
        settings: RemoteSettings,
        watcher: Arc<FileWatcher>,
    ) -> ConfigResult<Arc<Self>> {
        let folder = settings.section_folder(root);
        let settings = Arc::new(ArcSwap::from_pointee(settings));
        let local = Arc::new(LocalStore::new(folder, Arc::clone(&watcher))?);
        let source = RemoteSource::new(local, Arc::clone(&settings))?;

        Ok(Arc::new(Self {
            registry: ConfigRegistry::new(source),
            settings,
            watcher,
            polling: AtomicBool::new(false),
            downloading: DashSet::new(),
        }))
    }

    /// Live handle for section `name`.
    pub async fn get_section<T: ConfigSection>(&self, name: &str) -> ConfigResult<Section<T>> {
        self.registry.get_section(name).await
    }

    pub fn registry(&self) -> &ConfigRegistry<RemoteSource> {
        &self.registry
    }

    pub fn settings(&self) -> Arc<RemoteSettings> {
        self.settings.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SectionChanged> {
        self.registry.subscribe()
    }

    /// Whether a download of section `name` is in progress.
    pub fn is_downloading(&self, name: &str) -> bool {
        self.downloading.contains(&section_key(name))
    }

    /// Run poll cycles until `shutdown` fires.
    pub fn spawn_polling(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(
                interval_ms = manager.settings.load().timer_interval_ms,
                "Remote configuration polling started"
            );
            loop {
                let delay = poll_delay(manager.settings.load().timer_interval());
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        manager.poll_now().await;
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Remote configuration polling received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }

    /// Run one reconciliation cycle now.
    pub async fn poll_now(self: &Arc<Self>) -> PollOutcome {
        let settings = self.settings.load_full();
        if !settings.check_remote_config {
            return PollOutcome::Disabled;
        }

        let entries = self.registry.materialized();
        if entries.is_empty() {
            return PollOutcome::Idle;
        }

        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            metrics::record_poll_skipped();
            tracing::debug!("Previous poll cycle still running, tick skipped");
            return PollOutcome::Skipped;
        }
        let _guard = PollGuard(&self.polling);

        let local = self.registry.source().local();
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|entry| {
                !self.is_downloading(entry.name()) && !self.watcher.is_pending(&local.section_path(entry.name()))
            })
            .collect();
        let request = entries
            .iter()
            .map(|entry| RemoteSectionParam::request(entry.name(), entry.version()))
            .collect();

        let response = match self.registry.source().query(request).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_poll_cycle("failed");
                tracing::warn!(
                    url = %settings.remote_configuration_url,
                    error = %e,
                    "Poll cycle failed, keeping current configuration"
                );
                return PollOutcome::Failed;
            }
        };

        let mut scheduled = 0;
        for update in response.sections {
            let Some(entry) = entries.iter().find(|entry| update.names(entry.name())) else {
                tracing::debug!(section = %update.section_name, "Authority listed a section this process does not hold");
                continue;
            };
            if !update.is_newer_than(entry.version()) {
                continue;
            }

            // Released by the task once the reload is queued.
            self.downloading.insert(section_key(entry.name()));
            let manager = Arc::clone(self);
            let entry = Arc::clone(entry);
            tokio::spawn(async move { manager.apply_update(entry, update).await });
            scheduled += 1;
        }

        metrics::record_poll_cycle("completed");
        tracing::debug!(sections = entries.len(), scheduled, "Poll cycle completed");
        PollOutcome::Completed { scheduled }
    }

    async fn apply_update(&self, entry: Arc<ConfigEntry>, update: RemoteSectionParam) {
        let _slot = DownloadGuard {
            downloading: &self.downloading,
            key: section_key(entry.name()),
        };
        let source = self.registry.source();
        match source.download(&entry, &update).await {
            Ok(path) => {
                metrics::record_download(entry.name(), "installed");
                if let Err(e) = source.local().watch(&entry) {
                    tracing::error!(section = %entry.name(), error = %e, "Failed to watch downloaded section");
                }
                self.watcher.notify_changed(&path);
            }
            Err(e) => {
                metrics::record_download(entry.name(), "failed");
                tracing::error!(
                    section = %entry.name(),
                    version = %update.version(),
                    error = %e,
                    "Section download failed, keeping current document"
                );
            }
        }
    }

    fn watch_settings(&self, path: &Path) -> ConfigResult<bool> {
        let settings = Arc::clone(&self.settings);
        let client = Arc::clone(&self.registry.source().client);
        self.watcher.register(
            path,
            Arc::new(move |path: &Path| {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
                let (updated, version) = settings::parse_settings(&text)?;
                if updated.timeout() != client.load().connect_timeout {
                    client.store(Arc::new(HttpClient::build(&updated)?));
                    tracing::info!(timeout_ms = updated.timeout_ms, "HTTP client rebuilt for new connect timeout");
                }
                tracing::info!(
                    version = %version,
                    interval_ms = updated.timer_interval_ms,
                    check_remote = updated.check_remote_config,
                    "Remote configuration settings reloaded"
                );
                settings.store(Arc::new(updated));
                Ok(())
            }),
        )
    }
}
