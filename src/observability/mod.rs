//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! bootstrap, migration, assets, scheduler, lifecycle
//!     → logging.rs  (tracing events; operator notices on the alert target)
//!     → metrics.rs  (migration, asset and refresh counters, round latency)
//!
//! stdout        ← plain text or JSON lines
//! /metrics      ← Prometheus scrape, only when enabled
//! ```
//!
//! # Design Decisions
//! - Logs are the primary failure report; nothing structured leaves the process
//! - Metric macros are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
