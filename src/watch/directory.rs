//! Debounced change notification for the files of one directory.
//!
//! # Per-file state machine
//! ```text
//! Idle ──change──▶ Pending ──quiet period elapsed──▶ (callback) ──▶ Idle
//!                    │  ▲
//!                    └──┘ further changes are coalesced
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;

use crate::config::error::ConfigResult;
use crate::config::registry::section_key;
use crate::observability::metrics;
use crate::sync::ScopedRwLock;

/// Invoked with the full path of a file once its changes have settled.
pub type ReloadCallback = Arc<dyn Fn(&Path) -> ConfigResult<()> + Send + Sync>;

struct WatchState {
    directory: PathBuf,
    delay: Duration,
    runtime: Handle,
    /// Normalized file name → reload callback.
    registrations: ScopedRwLock<HashMap<String, ReloadCallback>>,
    /// Normalized file names with a reload timer running.
    pending: ScopedRwLock<HashSet<String>>,
}

impl WatchState {
    fn trigger(self: &Arc<Self>, file_name: &str) -> bool {
        let key = section_key(file_name);
        let Some(callback) = self
            .registrations
            .with_read(|registrations| registrations.get(&key).map(Arc::clone))
        else {
            return false;
        };
        // The reported name is the one on disk; the registered casing may differ.
        let file_name = file_name.to_string();

        if !self.pending.with_write(|pending| pending.insert(key.clone())) {
            tracing::trace!(file = %file_name, "Reload already pending, change coalesced");
            return false;
        }

        let state = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(state.delay).await;
            state.pending.with_write(|pending| pending.remove(&key));

            let path = state.directory.join(&file_name);
            let reload_path = path.clone();
            match tokio::task::spawn_blocking(move || callback(&reload_path)).await {
                Ok(Ok(())) => {
                    tracing::debug!(path = %path.display(), "Reload callback completed");
                }
                Ok(Err(e)) => {
                    metrics::record_reload_failure(&file_name);
                    tracing::error!(path = %path.display(), error = %e, "Reload callback failed");
                }
                Err(e) => {
                    metrics::record_reload_failure(&file_name);
                    tracing::error!(path = %path.display(), error = %e, "Reload callback panicked");
                }
            }
        });
        true
    }

    fn is_pending(&self, file_name: &str) -> bool {
        let key = section_key(file_name);
        self.pending.with_read(|pending| pending.contains(&key))
    }
}

/// Watches one directory with a single OS handle and dispatches debounced
/// reloads to the callbacks registered for its files.
pub struct DirectoryWatcher {
    state: Arc<WatchState>,
    _os_watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Start watching `directory`. Timers run on `runtime`.
    pub fn new(directory: &Path, delay: Duration, runtime: Handle) -> ConfigResult<Self> {
        let state = Arc::new(WatchState {
            directory: directory.to_path_buf(),
            delay,
            runtime,
            registrations: ScopedRwLock::default(),
            pending: ScopedRwLock::default(),
        });

        let handler_state = Arc::clone(&state);
        let mut os_watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    for path in &event.paths {
                        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                            handler_state.trigger(name);
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default(),
        )?;
        os_watcher.watch(directory, RecursiveMode::NonRecursive)?;

        tracing::info!(directory = %directory.display(), delay_ms = delay.as_millis() as u64, "Directory watcher started");
        Ok(Self {
            state,
            _os_watcher: os_watcher,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.state.directory
    }

    /// Register `callback` for `file_name`. Returns `false` if the file was
    /// already registered, in which case the first callback stays.
    pub fn register(&self, file_name: &str, callback: ReloadCallback) -> bool {
        let key = section_key(file_name);
        self.state.registrations.with_write(|registrations| {
            if registrations.contains_key(&key) {
                return false;
            }
            registrations.insert(key, callback);
            true
        })
    }

    pub fn unregister(&self, file_name: &str) -> bool {
        let key = section_key(file_name);
        self.state
            .registrations
            .with_write(|registrations| registrations.remove(&key).is_some())
    }

    pub fn is_registered(&self, file_name: &str) -> bool {
        let key = section_key(file_name);
        self.state
            .registrations
            .with_read(|registrations| registrations.contains_key(&key))
    }

    /// Report a change without waiting for the OS. Returns `true` when a
    /// new reload timer was started.
    pub fn notify_changed(&self, file_name: &str) -> bool {
        self.state.trigger(file_name)
    }

    /// Whether a reload of `file_name` is waiting for its quiet period.
    pub fn is_pending(&self, file_name: &str) -> bool {
        self.state.is_pending(file_name)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    kind.is_create() || kind.is_modify() || kind.is_remove()
}
