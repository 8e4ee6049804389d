//! Process-scoped multiplexer of directory watchers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;

use crate::config::error::{ConfigError, ConfigResult};
use crate::watch::directory::{DirectoryWatcher, ReloadCallback};

/// Quiet period used when none is configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Owns one [`DirectoryWatcher`] per watched directory.
///
/// Construct one per process at the composition root and share it through
/// an `Arc`.
pub struct FileWatcher {
    directories: DashMap<PathBuf, Arc<DirectoryWatcher>>,
    delay: Duration,
    runtime: Handle,
}

impl FileWatcher {
    /// Create a watcher with the default quiet period. Must be called from
    /// within a Tokio runtime.
    pub fn new() -> ConfigResult<Self> {
        Self::with_delay(DEFAULT_DEBOUNCE)
    }

    /// Create a watcher with a custom quiet period.
    pub fn with_delay(delay: Duration) -> ConfigResult<Self> {
        let runtime = Handle::try_current().map_err(|e| ConfigError::Runtime(e.to_string()))?;
        Ok(Self {
            directories: DashMap::new(),
            delay,
            runtime,
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Register `callback` for `path`. Re-registering a path is a no-op
    /// and returns `false`.
    pub fn register(&self, path: &Path, callback: ReloadCallback) -> ConfigResult<bool> {
        let (directory, file_name) = split_path(path)?;
        let watcher = self.directory_watcher(directory)?;
        let added = watcher.register(file_name, callback);
        if added {
            tracing::debug!(path = %path.display(), "File registered for reload");
        }
        Ok(added)
    }

    pub fn unregister(&self, path: &Path) -> bool {
        let Ok((directory, file_name)) = split_path(path) else {
            return false;
        };
        self.directories
            .get(directory)
            .map(|watcher| watcher.unregister(file_name))
            .unwrap_or(false)
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.lookup(path, |watcher, file_name| watcher.is_registered(file_name))
    }

    /// Report that this process just changed `path`, entering the same
    /// debounced reload path as an OS notification would.
    pub fn notify_changed(&self, path: &Path) -> bool {
        self.lookup(path, |watcher, file_name| watcher.notify_changed(file_name))
    }

    /// Whether a reload for `path` is still waiting for its quiet period.
    pub fn is_pending(&self, path: &Path) -> bool {
        self.lookup(path, |watcher, file_name| watcher.is_pending(file_name))
    }

    /// Number of directories with an OS watch handle.
    pub fn watched_directories(&self) -> usize {
        self.directories.len()
    }

    fn lookup(&self, path: &Path, f: impl FnOnce(&DirectoryWatcher, &str) -> bool) -> bool {
        let Ok((directory, file_name)) = split_path(path) else {
            return false;
        };
        match self.directories.get(directory) {
            Some(watcher) => f(&watcher, file_name),
            None => false,
        }
    }

    fn directory_watcher(&self, directory: &Path) -> ConfigResult<Arc<DirectoryWatcher>> {
        if let Some(watcher) = self.directories.get(directory) {
            return Ok(Arc::clone(&watcher));
        }

        // The shard stays locked while the OS handle is created, so two
        // first registrations in one directory end up sharing a handle.
        match self.directories.entry(directory.to_path_buf()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let watcher = Arc::new(DirectoryWatcher::new(
                    directory,
                    self.delay,
                    self.runtime.clone(),
                )?);
                entry.insert(Arc::clone(&watcher));
                Ok(watcher)
            }
        }
    }
}

fn split_path(path: &Path) -> ConfigResult<(&Path, &str)> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ConfigError::InvalidArgument(format!("'{}' does not name a file", path.display()))
        })?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((directory, file_name))
}
