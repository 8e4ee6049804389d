//! Remote configuration distribution.
//!
//! # Data Flow
//! ```text
//! timer (settings.timer_interval, re-armed after each cycle)
//!     → manager.rs collects materialized entries (name, major, minor)
//!     → protocol.rs request → POST authority → sections with newer minor
//!     → per section, concurrently:
//!         GET downloadUrl → entry checker → download.rs atomic install
//!         → FileWatcher::notify_changed → debounced reload → new snapshot
//! ```
//!
//! # Design Decisions
//! - The bootstrap settings are themselves a watched versioned document
//! - A payload that fails the checker never touches the disk
//! - Cold start without a reachable authority serves defaults and lets
//!   the next successful poll fill them in

pub mod download;
pub mod environment;
pub mod manager;
pub mod protocol;
pub mod settings;

pub use download::BackupPolicy;
pub use environment::NetworkEnvironment;
pub use manager::{PollOutcome, RemoteConfigManager, RemoteSource};
pub use protocol::{RemoteSectionCollection, RemoteSectionParam};
pub use settings::RemoteSettings;
