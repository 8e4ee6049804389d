//! A single named, lazily materialized configuration value.
//!
//! # Lifecycle
//! ```text
//! created on first request for the name
//!     → materialized on first access (once, concurrent callers wait)
//!     → republished in place by reloads (handle never changes)
//!     → dropped with the registry
//! ```
//!
//! A failed materialization leaves the entry unset, so the next access
//! tries again.

use std::future::Future;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use crate::config::document::{self, DocumentVersion};
use crate::config::error::{ConfigError, ConfigResult};
use crate::config::section::{ConfigSection, ReloadOutcome, Section, SectionSlot};

/// Decodes a document into the entry's type and reports its version,
/// without publishing anything.
pub type Checker = Arc<dyn Fn(&str) -> ConfigResult<DocumentVersion> + Send + Sync>;

/// Registry entry for one section.
pub struct ConfigEntry {
    name: String,
    type_name: &'static str,
    major_version: AtomicI32,
    minor_version: AtomicI32,
    checker: Checker,
    slot: OnceCell<Arc<dyn SectionSlot>>,
    /// Serializes reloads of this entry.
    writer: Mutex<()>,
}

impl std::fmt::Debug for ConfigEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigEntry")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("version", &self.version())
            .field("is_set", &self.is_set())
            .finish()
    }
}

impl ConfigEntry {
    pub(crate) fn new<T: ConfigSection>(name: impl Into<String>) -> Self {
        let name = name.into();
        let section = name.clone();
        Self {
            name,
            type_name: std::any::type_name::<T>(),
            major_version: AtomicI32::new(T::MAJOR_VERSION),
            minor_version: AtomicI32::new(-1),
            checker: Arc::new(move |text| {
                document::decode::<T>(&section, text).map(|doc| doc.version)
            }),
            slot: OnceCell::new(),
            writer: Mutex::new(()),
        }
    }

    /// Section name as first requested.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type the section is bound to.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn major_version(&self) -> i32 {
        self.major_version.load(Ordering::Acquire)
    }

    /// Minor version of the published value; `-1` until a document has
    /// been loaded.
    pub fn minor_version(&self) -> i32 {
        self.minor_version.load(Ordering::Acquire)
    }

    pub fn version(&self) -> DocumentVersion {
        DocumentVersion::new(self.major_version(), self.minor_version())
    }

    /// Whether the value has been materialized.
    pub fn is_set(&self) -> bool {
        self.slot.initialized()
    }

    /// Run the type's checker over a candidate document.
    pub fn check(&self, text: &str) -> ConfigResult<DocumentVersion> {
        (self.checker)(text)
    }

    /// Shareable copy of the checker, for work that outlives `&self`.
    pub fn checker(&self) -> Checker {
        Arc::clone(&self.checker)
    }

    /// Typed handle, if the entry is materialized and bound to `T`.
    pub fn section<T: ConfigSection>(&self) -> Option<Section<T>> {
        self.slot
            .get()
            .and_then(|slot| slot.as_any().downcast_ref::<Section<T>>())
            .cloned()
    }

    pub(crate) fn set_version(&self, version: DocumentVersion) {
        self.major_version.store(version.major, Ordering::Release);
        self.minor_version.store(version.minor, Ordering::Release);
    }

    pub(crate) async fn get_or_init<F, Fut>(&self, init: F) -> ConfigResult<&Arc<dyn SectionSlot>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConfigResult<Arc<dyn SectionSlot>>>,
    {
        self.slot.get_or_try_init(init).await
    }

    pub(crate) fn typed<T: ConfigSection>(&self, slot: &Arc<dyn SectionSlot>) -> ConfigResult<Section<T>> {
        slot.as_any()
            .downcast_ref::<Section<T>>()
            .cloned()
            .ok_or_else(|| ConfigError::TypeMismatch {
                section: self.name.clone(),
                registered: self.type_name,
                requested: std::any::type_name::<T>(),
            })
    }

    /// Republish the value from `text`.
    ///
    /// A document whose minor version is below the published one is
    /// dropped, so the recorded version never moves backwards. Reloading
    /// the same content twice yields the same value.
    pub fn reload(&self, text: &str) -> ConfigResult<ReloadOutcome> {
        let Some(slot) = self.slot.get() else {
            return Ok(ReloadOutcome::NotMaterialized);
        };

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = slot.replace(&self.name, text, self.minor_version())?;
        if let ReloadOutcome::Applied(version) = outcome {
            self.set_version(version);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::section::GenericSection;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn slot_from(text: &str) -> ConfigResult<Arc<dyn SectionSlot>> {
        let doc = document::decode::<GenericSection>("demo", text)?;
        Ok(Arc::new(Section::new(doc.value)))
    }

    #[tokio::test]
    async fn test_concurrent_first_access_constructs_once() {
        let entry = Arc::new(ConfigEntry::new::<GenericSection>("demo"));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let entry = entry.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    let slot = entry
                        .get_or_init(|| async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            slot_from("majorVersion = 1\nminorVersion = 3\n")
                        })
                        .await
                        .unwrap();
                    entry.typed::<GenericSection>(slot).unwrap()
                })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| w[0].ptr_eq(&w[1])));
        assert!(entry.is_set());
    }

    #[tokio::test]
    async fn test_failure_leaves_entry_unset() {
        let entry = ConfigEntry::new::<GenericSection>("demo");

        let first = entry
            .get_or_init(|| async {
                Err(ConfigError::io("demo.config", std::io::Error::other("offline")))
            })
            .await;
        assert!(first.is_err());
        assert!(!entry.is_set());

        let second = entry
            .get_or_init(|| async { slot_from("majorVersion = 1\n") })
            .await;
        assert!(second.is_ok());
        assert!(entry.is_set());
    }

    #[tokio::test]
    async fn test_reload_keeps_version_monotonic() {
        let entry = ConfigEntry::new::<GenericSection>("demo");
        assert_eq!(
            entry.reload("majorVersion = 1\nminorVersion = 1\n").unwrap(),
            ReloadOutcome::NotMaterialized
        );

        entry
            .get_or_init(|| async { slot_from("majorVersion = 1\nminorVersion = 4\n") })
            .await
            .unwrap();
        entry.set_version(DocumentVersion::new(1, 4));

        let older = entry.reload("majorVersion = 1\nminorVersion = 2\nk = 1\n").unwrap();
        assert_eq!(older, ReloadOutcome::Stale(DocumentVersion::new(1, 2)));
        assert_eq!(entry.minor_version(), 4);

        let newer = entry.reload("majorVersion = 1\nminorVersion = 6\nk = 2\n").unwrap();
        assert_eq!(newer, ReloadOutcome::Applied(DocumentVersion::new(1, 6)));
        assert_eq!(entry.minor_version(), 6);

        let handle = entry.section::<GenericSection>().unwrap();
        assert_eq!(handle.load().get("k").and_then(|v| v.as_integer()), Some(2));
    }

    #[test]
    fn test_checker_uses_declared_major() {
        let entry = ConfigEntry::new::<GenericSection>("demo");
        assert_eq!(entry.major_version(), 1);
        assert_eq!(entry.minor_version(), -1);
        assert!(entry.check("majorVersion = 1\nminorVersion = 9\n").is_ok());
        assert!(matches!(
            entry.check("majorVersion = 3\n"),
            Err(ConfigError::VersionMismatch { .. })
        ));
    }
}
