//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Listener and hosting server produce:
//!     → logging.rs (structured log events)
//! Every read/write on an accepted connection produces:
//!     → metrics.rs (latency summaries)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
