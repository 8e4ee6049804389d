//! Section registry: name → entry, with a pluggable create-on-miss backend.
//!
//! # Responsibilities
//! - Case-insensitive get-or-create of entries (read lock, then write lock)
//! - Lazy materialization through the backend's [`SectionSource::on_create`]
//! - One place where creation failures are logged
//!
//! # Design Decisions
//! - A backend that finds nothing yields a default-constructed section,
//!   so a registered type never comes back empty
//! - Schema errors (major mismatch, malformed document) reach the caller;
//!   the entry stays unset and the next request retries

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::document::{self, DocumentVersion};
use crate::config::entry::ConfigEntry;
use crate::config::error::{ConfigError, ConfigResult};
use crate::config::section::{ConfigSection, Section, SectionSlot};
use crate::observability::metrics;
use crate::sync::ScopedRwLock;

/// Raw document produced by a backend.
#[derive(Debug, Clone)]
pub struct SectionDocument {
    pub text: String,
    /// Where the document was read from, if it lives on disk.
    pub path: Option<PathBuf>,
}

/// Published after a section was republished from a newer document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionChanged {
    pub section: String,
    pub version: DocumentVersion,
}

/// Materialization strategy for sections nobody has asked for yet.
pub trait SectionSource: Send + Sync + 'static {
    /// Produce the document for `entry`, or `None` when the backend has
    /// nothing for it.
    fn on_create(
        &self,
        entry: &Arc<ConfigEntry>,
    ) -> impl Future<Output = ConfigResult<Option<SectionDocument>>> + Send;

    /// Channel on which the backend announces reloads.
    fn changes(&self) -> &broadcast::Sender<SectionChanged>;
}

/// Registry of configuration sections backed by `S`.
pub struct ConfigRegistry<S> {
    entries: ScopedRwLock<HashMap<String, Arc<ConfigEntry>>>,
    source: S,
}

impl<S: SectionSource> ConfigRegistry<S> {
    pub fn new(source: S) -> Self {
        Self {
            entries: ScopedRwLock::default(),
            source,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get the live handle for section `name`, materializing it on first use.
    pub async fn get_section<T: ConfigSection>(&self, name: &str) -> ConfigResult<Section<T>> {
        validate_name(name)?;

        let entry = self.get_or_create::<T>(name);
        if entry.type_name() != std::any::type_name::<T>() {
            return Err(self.handle_exception(
                name,
                ConfigError::TypeMismatch {
                    section: entry.name().to_string(),
                    registered: entry.type_name(),
                    requested: std::any::type_name::<T>(),
                },
            ));
        }

        let slot = entry
            .get_or_init(|| self.materialize::<T>(&entry))
            .await
            .map_err(|e| self.handle_exception(name, e))?;

        entry.typed::<T>(slot)
    }

    /// Entry for `name`, if it was ever requested.
    pub fn entry(&self, name: &str) -> Option<Arc<ConfigEntry>> {
        let key = section_key(name);
        self.entries.with_read(|entries| entries.get(&key).cloned())
    }

    /// All entries, materialized or not.
    pub fn entries(&self) -> Vec<Arc<ConfigEntry>> {
        self.entries.with_read(|entries| entries.values().cloned().collect())
    }

    /// Entries whose value has been materialized.
    pub fn materialized(&self) -> Vec<Arc<ConfigEntry>> {
        self.entries.with_read(|entries| {
            entries
                .values()
                .filter(|entry| entry.is_set())
                .cloned()
                .collect()
        })
    }

    /// Subscribe to reload notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SectionChanged> {
        self.source.changes().subscribe()
    }

    fn get_or_create<T: ConfigSection>(&self, name: &str) -> Arc<ConfigEntry> {
        let key = section_key(name);
        self.entries.get_or_insert_with(
            |entries| entries.get(&key).cloned(),
            |entries| {
                tracing::debug!(section = %name, ty = std::any::type_name::<T>(), "Registering section");
                let entry = Arc::new(ConfigEntry::new::<T>(name));
                entries.insert(key.clone(), Arc::clone(&entry));
                entry
            },
        )
    }

    async fn materialize<T: ConfigSection>(
        &self,
        entry: &Arc<ConfigEntry>,
    ) -> ConfigResult<Arc<dyn SectionSlot>> {
        let value = match self.source.on_create(entry).await? {
            Some(doc) => {
                let decoded = document::decode::<T>(entry.name(), &doc.text)?;
                entry.set_version(decoded.version);
                tracing::info!(
                    section = %entry.name(),
                    version = %decoded.version,
                    path = ?doc.path,
                    "Section loaded"
                );
                decoded.value
            }
            None => {
                tracing::info!(
                    section = %entry.name(),
                    "No document found for section, using defaults"
                );
                T::default()
            }
        };

        metrics::record_section_materialized();
        Ok(Arc::new(Section::new(value)))
    }

    /// Log a failure in one place and hand it back for propagation.
    fn handle_exception(&self, section: &str, error: ConfigError) -> ConfigError {
        if error.is_transient() {
            tracing::warn!(section = %section, error = %error, "Section creation failed");
        } else {
            tracing::error!(section = %section, error = %error, "Section rejected");
        }
        error
    }
}

/// Normalized form of a section name. Every case-insensitive comparison of
/// section or file names goes through this.
pub fn section_key(name: &str) -> String {
    name.to_lowercase()
}

pub(crate) fn validate_name(name: &str) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::InvalidArgument(
            "section name must not be empty".into(),
        ));
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(ConfigError::InvalidArgument(format!(
            "section name '{name}' must not contain path separators"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::section::GenericSection;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Foo {
        some_field: String,
    }

    impl ConfigSection for Foo {
        const MAJOR_VERSION: i32 = 1;
    }

    /// In-memory backend: fails the first `failures` calls, then serves `text`.
    struct StubSource {
        text: Option<String>,
        failures: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
        changes: broadcast::Sender<SectionChanged>,
    }

    impl StubSource {
        fn new(text: Option<&str>) -> Self {
            Self {
                text: text.map(str::to_string),
                failures: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                changes: broadcast::channel(8).0,
            }
        }
    }

    impl SectionSource for StubSource {
        async fn on_create(&self, _entry: &Arc<ConfigEntry>) -> ConfigResult<Option<SectionDocument>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ConfigError::io("stub.config", std::io::Error::other("offline")));
            }
            Ok(self.text.clone().map(|text| SectionDocument { text, path: None }))
        }

        fn changes(&self) -> &broadcast::Sender<SectionChanged> {
            &self.changes
        }
    }

    #[tokio::test]
    async fn test_loads_document_and_version() {
        let registry = ConfigRegistry::new(StubSource::new(Some(
            "majorVersion = 1\nminorVersion = 5\nsome_field = \"hello\"\n",
        )));

        let foo = registry.get_section::<Foo>("foo").await.unwrap();
        assert_eq!(foo.load().some_field, "hello");

        let entry = registry.entry("FOO").unwrap();
        assert_eq!(entry.version(), DocumentVersion::new(1, 5));
        assert!(entry.is_set());
    }

    #[tokio::test]
    async fn test_names_are_case_insensitive() {
        let registry = ConfigRegistry::new(StubSource::new(Some("majorVersion = 1\n")));

        let a = registry.get_section::<Foo>("AppSettings").await.unwrap();
        let b = registry.get_section::<Foo>("appsettings").await.unwrap();

        assert!(a.ptr_eq(&b));
        assert_eq!(registry.entries().len(), 1);
        assert_eq!(registry.source().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_access() {
        let mut source = StubSource::new(Some("majorVersion = 1\nsome_field = \"x\"\n"));
        source.delay = Duration::from_millis(50);
        let registry = Arc::new(ConfigRegistry::new(source));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_section::<Foo>("foo").await.unwrap() })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(registry.source().calls.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| w[0].ptr_eq(&w[1])));
    }

    #[tokio::test]
    async fn test_missing_document_yields_default() {
        let registry = ConfigRegistry::new(StubSource::new(None));

        let foo = registry.get_section::<Foo>("foo").await.unwrap();
        assert_eq!(*foo.load(), Foo::default());
        assert_eq!(registry.entry("foo").unwrap().minor_version(), -1);
    }

    #[tokio::test]
    async fn test_failed_creation_is_retried() {
        let source = StubSource::new(Some("majorVersion = 1\nsome_field = \"ok\"\n"));
        source.failures.store(1, Ordering::SeqCst);
        let registry = ConfigRegistry::new(source);

        let err = registry.get_section::<Foo>("foo").await.unwrap_err();
        assert!(err.is_transient());
        assert!(registry.materialized().is_empty());

        let foo = registry.get_section::<Foo>("foo").await.unwrap();
        assert_eq!(foo.load().some_field, "ok");
        assert_eq!(registry.source().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_major_mismatch_propagates() {
        let registry = ConfigRegistry::new(StubSource::new(Some("majorVersion = 9\n")));

        let err = registry.get_section::<Foo>("foo").await.unwrap_err();
        assert!(matches!(err, ConfigError::VersionMismatch { expected: 1, actual: 9, .. }));
        assert!(!registry.entry("foo").unwrap().is_set());
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let registry = ConfigRegistry::new(StubSource::new(Some("majorVersion = 1\n")));
        registry.get_section::<Foo>("foo").await.unwrap();

        let err = registry.get_section::<GenericSection>("foo").await.unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_rejects_bad_names() {
        let registry = ConfigRegistry::new(StubSource::new(None));
        for name in ["", "  ", "../etc/passwd", "a/b"] {
            let err = registry.get_section::<Foo>(name).await.unwrap_err();
            assert!(matches!(err, ConfigError::InvalidArgument(_)), "{name}");
        }
        assert!(registry.entries().is_empty());
    }

    #[test]
    fn test_section_key_folds_non_ascii() {
        assert_eq!(section_key("ÄppSettings"), section_key("äPPsettings"));
        assert_ne!(section_key("app"), section_key("apps"));
    }
}
