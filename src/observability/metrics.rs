//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Record per-operation read/write latency of accepted connections
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_conn_read_op_duration_seconds` (summary): duration of each read call
//! - `proxy_conn_write_op_duration_seconds` (summary): duration of each write call
//!
//! # Design Decisions
//! - Latency sinks sit behind the `OpLatency` trait so connections do not
//!   depend on a global recorder being installed
//! - Summaries cover p50/p90/p97/p99/max over a rolling window

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tokio::time::Instant;

pub const READ_OP_DURATION: &str = "proxy_conn_read_op_duration_seconds";
pub const WRITE_OP_DURATION: &str = "proxy_conn_write_op_duration_seconds";

/// Quantiles exported for operation latency summaries.
pub const OP_DURATION_QUANTILES: [f64; 5] = [0.5, 0.9, 0.97, 0.99, 1.0];

/// Sink for connection operation latency.
///
/// Each call is one observation; implementations must tolerate concurrent
/// calls from many connections.
pub trait OpLatency: Send + Sync {
    /// Record a read that started at `start` and has just finished.
    fn observe_read(&self, start: Instant);

    /// Record a write that started at `start` and has just finished.
    fn observe_write(&self, start: Instant);
}

/// `OpLatency` backed by the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusOpLatency;

impl OpLatency for PrometheusOpLatency {
    fn observe_read(&self, start: Instant) {
        histogram!(READ_OP_DURATION).record(start.elapsed().as_secs_f64());
    }

    fn observe_write(&self, start: Instant) {
        histogram!(WRITE_OP_DURATION).record(start.elapsed().as_secs_f64());
    }
}

/// Which side of a connection an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// Records one latency observation when dropped.
///
/// Dropping covers every way an operation can end: normal return, early
/// return, cancellation of the enclosing future, and unwinding.
pub struct LatencyTimer<'a> {
    sink: &'a dyn OpLatency,
    direction: Direction,
    start: Instant,
}

impl<'a> LatencyTimer<'a> {
    pub fn start(sink: &'a dyn OpLatency, direction: Direction) -> Self {
        Self {
            sink,
            direction,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer<'_> {
    fn drop(&mut self) {
        match self.direction {
            Direction::Read => self.sink.observe_read(self.start),
            Direction::Write => self.sink.observe_write(self.start),
        }
    }
}

/// Install the Prometheus exporter and serve it on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr, window: Duration) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_quantiles(&OP_DURATION_QUANTILES)?
        .set_bucket_duration(window)?
        .install()?;

    describe_histogram!(
        READ_OP_DURATION,
        Unit::Seconds,
        "Duration of read calls on accepted connections"
    );
    describe_histogram!(
        WRITE_OP_DURATION,
        Unit::Seconds,
        "Duration of write calls on accepted connections"
    );

    tracing::info!(address = %addr, window_secs = window.as_secs(), "Metrics exporter listening");
    Ok(())
}
