//! Remote configuration distribution.
//!
//! Typed, versioned configuration sections read from local files, kept in
//! sync with a central authority, and hot-swapped in place when a newer
//! document lands on disk.

// Core subsystems
pub mod config;
pub mod remote;
pub mod watch;

// Reference authority server
pub mod authority;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod sync;

pub use config::{
    ConfigError, ConfigResult, ConfigSection, DocumentVersion, GenericSection, LocalConfigManager,
    Section, SectionChanged,
};
pub use lifecycle::Shutdown;
pub use remote::{RemoteConfigManager, RemoteSettings};
pub use watch::FileWatcher;
