//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (tracing events, filtered by --logging_level / RUST_LOG)
//!     → metrics.rs (gauges and counters)
//!
//! Consumers:
//!     → stderr
//!     → GET /metrics (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metric updates are free when no recorder is installed
//! - The recorder is process-global and installed at most once

pub mod logging;
pub mod metrics;
