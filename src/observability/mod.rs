//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! registry / watchers / poller produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Every log line about a section carries a `section` field
//! - Metrics are no-ops until a recorder is installed, so the library
//!   never requires an exporter

pub mod logging;
pub mod metrics;
