//! File change detection subsystem.
//!
//! # Data Flow
//! ```text
//! OS notification (notify)          in-process write (download)
//!     → directory.rs                    → file_watcher.rs notify_changed()
//!          │                                │
//!          └──────────► per-file debounce ◄─┘
//!                          │ quiet period elapsed
//!                          ▼
//!                  reload callback (full path)
//! ```
//!
//! # Design Decisions
//! - One OS watch handle per directory, shared by every file in it
//! - File names are matched case-insensitively
//! - At most one pending reload per file; changes during the wait are coalesced
//! - A failing callback is logged and never stops the watcher

pub mod directory;
pub mod file_watcher;

pub use directory::{DirectoryWatcher, ReloadCallback};
pub use file_watcher::FileWatcher;
