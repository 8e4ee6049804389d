//! Resilience helpers.
//!
//! # Design Decisions
//! - Poll timers are jittered so a fleet restarted together does not hit
//!   the authority in lockstep
//! - Timeouts live on the HTTP client (connect) and on each request
//!   (read/write), both taken from the remote settings

pub mod backoff;
