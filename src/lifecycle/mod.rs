//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → poll loop exits → authority server drains → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT (Ctrl-C) → trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Background tasks subscribe before they start, so none misses the signal
//! - Settings reload is file driven; no SIGHUP handling is needed

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
