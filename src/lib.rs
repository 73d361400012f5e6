//! Per-operation read/write timeouts for accepted stream connections.
//!
//! A `TimeoutListener` wraps a listener so every accepted connection is a
//! `TimeoutConnection`: each read or write is bounded by a synthetic deadline
//! while the application has none of its own, and every call's latency is
//! reported to an `OpLatency` sink.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;

pub use config::GatewayConfig;
pub use net::{Connection, Deadline, OpTimeouts, StreamListener, TimeoutConnection, TimeoutListener};
pub use observability::metrics::{OpLatency, PrometheusOpLatency};
