//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! get_section::<T>(name)
//!     → registry.rs (case-insensitive get-or-create of the entry)
//!     → entry.rs (lazy, once: first caller materializes, others wait)
//!     → SectionSource::on_create (local.rs, or remote::RemoteSource)
//!     → document.rs (split version attributes, decode into T)
//!     → Section<T> handle shared by every caller
//!
//! On change:
//!     watch/ fires the debounced reload for the file
//!     → local.rs re-reads it
//!     → entry.rs publishes a new snapshot into the same handle
//!     → SectionChanged broadcast
//! ```
//!
//! # Design Decisions
//! - Sections are immutable snapshots; updates swap the snapshot atomically
//! - Each section type declares its major version; mismatches are hard errors
//! - A missing document is not an error: the section falls back to `T::default()`
//! - Validation separates syntactic (serde) from semantic checks

pub mod document;
pub mod entry;
pub mod error;
pub mod local;
pub mod registry;
pub mod section;
pub mod validation;

pub use document::{DocumentVersion, VersionedDocument};
pub use entry::ConfigEntry;
pub use error::{ConfigError, ConfigResult};
pub use local::{LocalConfigManager, LocalSource, LocalStore};
pub use registry::{ConfigRegistry, SectionChanged, SectionDocument, SectionSource};
pub use section::{ConfigSection, GenericSection, ReloadOutcome, Section};
