//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor, watcher, reload loop, engine produce:
//!     → logging.rs (structured log events, stderr)
//!     → metrics.rs (reload counters, generation gauge)
//!
//! Consumers:
//!     → Log aggregation (journald, container runtime)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Logs go to stderr so `--dump` output on stdout stays clean
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
