//! Local-disk backend: one `<section>.config` file per section.
//!
//! # Responsibilities
//! - Map section names to files under the section folder
//! - Read documents, reporting a missing file as "nothing here" rather than an error
//! - Register loaded files with the [`FileWatcher`] so edits republish the section

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::entry::ConfigEntry;
use crate::config::error::{ConfigError, ConfigResult};
use crate::config::registry::{section_key, ConfigRegistry, SectionChanged, SectionDocument, SectionSource};
use crate::config::section::ReloadOutcome;
use crate::observability::metrics;
use crate::watch::FileWatcher;

/// Extension of every section document.
pub const SECTION_EXTENSION: &str = "config";

/// Folder of section documents plus the watch registrations for them.
pub struct LocalStore {
    folder: PathBuf,
    watcher: Arc<FileWatcher>,
    changes: broadcast::Sender<SectionChanged>,
}

impl LocalStore {
    /// Open (creating if needed) the section folder.
    pub fn new(folder: impl Into<PathBuf>, watcher: Arc<FileWatcher>) -> ConfigResult<Self> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder).map_err(|e| ConfigError::io(&folder, e))?;
        let (changes, _) = broadcast::channel(64);
        Ok(Self {
            folder,
            watcher,
            changes,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn watcher(&self) -> &Arc<FileWatcher> {
        &self.watcher
    }

    /// Document path of `section`: the existing file whose name matches
    /// case-insensitively (an exact match wins), else
    /// `<folder>/<section>.config`.
    pub fn section_path(&self, section: &str) -> PathBuf {
        let file_name = format!("{section}.{SECTION_EXTENSION}");
        let wanted = section_key(&file_name);

        let mut found = None;
        if let Ok(entries) = std::fs::read_dir(&self.folder) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name == file_name {
                    return entry.path();
                }
                if found.is_none() && section_key(name) == wanted {
                    found = Some(entry.path());
                }
            }
        }
        found.unwrap_or_else(|| self.folder.join(file_name))
    }

    /// Read the document for `entry` and start watching its file.
    pub async fn load(&self, entry: &Arc<ConfigEntry>) -> ConfigResult<Option<SectionDocument>> {
        let path = self.section_path(entry.name());
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                self.watch(entry)?;
                Ok(Some(SectionDocument {
                    text,
                    path: Some(path),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(section = %entry.name(), path = %path.display(), "No local document");
                Ok(None)
            }
            Err(e) => Err(ConfigError::io(path, e)),
        }
    }

    /// Register the entry's file for reload. Idempotent.
    pub fn watch(&self, entry: &Arc<ConfigEntry>) -> ConfigResult<bool> {
        let path = self.section_path(entry.name());
        let entry = Arc::clone(entry);
        let changes = self.changes.clone();
        self.watcher.register(
            &path,
            Arc::new(move |path: &Path| reload_entry(&entry, path, &changes)),
        )
    }

    pub fn changes(&self) -> &broadcast::Sender<SectionChanged> {
        &self.changes
    }
}

/// Re-read `path` and republish it into `entry`.
fn reload_entry(
    entry: &ConfigEntry,
    path: &Path,
    changes: &broadcast::Sender<SectionChanged>,
) -> ConfigResult<()> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

    match entry.reload(&text)? {
        ReloadOutcome::Applied(version) => {
            metrics::record_reload(entry.name(), "applied");
            tracing::info!(section = %entry.name(), version = %version, "Section reloaded");
            let _ = changes.send(SectionChanged {
                section: entry.name().to_string(),
                version,
            });
        }
        ReloadOutcome::Stale(version) => {
            metrics::record_reload(entry.name(), "stale");
            tracing::warn!(
                section = %entry.name(),
                version = %version,
                current = entry.minor_version(),
                "Ignoring document older than the published section"
            );
        }
        ReloadOutcome::NotMaterialized => {
            tracing::debug!(section = %entry.name(), "Section not materialized, reload skipped");
        }
    }
    Ok(())
}

/// Backend that only consults the local folder.
pub struct LocalSource {
    store: Arc<LocalStore>,
}

impl LocalSource {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }
}

impl SectionSource for LocalSource {
    async fn on_create(&self, entry: &Arc<ConfigEntry>) -> ConfigResult<Option<SectionDocument>> {
        self.store.load(entry).await
    }

    fn changes(&self) -> &broadcast::Sender<SectionChanged> {
        self.store.changes()
    }
}

/// Registry served from local files only.
pub type LocalConfigManager = ConfigRegistry<LocalSource>;

impl LocalConfigManager {
    /// Registry over `folder`, watched through `watcher`.
    pub fn open(folder: impl Into<PathBuf>, watcher: Arc<FileWatcher>) -> ConfigResult<Self> {
        let store = Arc::new(LocalStore::new(folder, watcher)?);
        Ok(ConfigRegistry::new(LocalSource::new(store)))
    }
}
