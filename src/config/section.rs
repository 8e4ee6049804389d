//! Typed configuration sections and their live handles.

use std::any::Any;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::document::{self, DocumentVersion};
use crate::config::error::ConfigResult;

/// A named, independently versioned unit of configuration.
///
/// `MAJOR_VERSION` is the schema the type understands. A document stored
/// under any other major version is refused at load time.
pub trait ConfigSection: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    const MAJOR_VERSION: i32;
}

/// Live handle to a published section.
///
/// Every clone observes the same value. A reload publishes a new snapshot
/// into the handle instead of mutating fields, so a reader holding the
/// result of [`Section::load`] always sees one complete version.
pub struct Section<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for Section<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Section<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Section").field(&self.inner.load()).finish()
    }
}

impl<T: ConfigSection> Section<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(value)),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Whether two handles publish the same live value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn store(&self, value: T) {
        self.inner.store(Arc::new(value));
    }
}

/// What a reload did with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The document was published.
    Applied(DocumentVersion),
    /// The document is older than the published value and was dropped.
    Stale(DocumentVersion),
    /// Nobody has asked for the section yet; there is nothing to update.
    NotMaterialized,
}

/// Type-erased view of a `Section<T>`, kept by the untyped entry table.
pub(crate) trait SectionSlot: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Decode `text` and publish it unless its minor version is below
    /// `floor_minor`.
    fn replace(&self, section: &str, text: &str, floor_minor: i32) -> ConfigResult<ReloadOutcome>;
}

impl<T: ConfigSection> SectionSlot for Section<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn replace(&self, section: &str, text: &str, floor_minor: i32) -> ConfigResult<ReloadOutcome> {
        let decoded = document::decode::<T>(section, text)?;
        if decoded.version.minor < floor_minor {
            return Ok(ReloadOutcome::Stale(decoded.version));
        }
        self.store(decoded.value);
        Ok(ReloadOutcome::Applied(decoded.version))
    }
}

/// Schema-less section: any table of keys, major version 1.
///
/// Useful for tooling that relays sections without knowing their shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenericSection(pub toml::Table);

impl ConfigSection for GenericSection {
    const MAJOR_VERSION: i32 = 1;
}

impl GenericSection {
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.0.get(key)
    }
}
