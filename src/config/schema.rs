//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::OpTimeouts;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where accepted connections are relayed to.
    pub upstream: UpstreamConfig,

    /// Per-operation timeouts on accepted connections.
    pub timeouts: ConnTimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8427").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8427".to_string(),
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:8428").
    pub address: String,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8428".to_string(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Per-operation timeout configuration. Zero disables a direction.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ConnTimeoutConfig {
    /// Upper bound for a single read on an accepted connection, in milliseconds.
    pub read_op_timeout_ms: u64,

    /// Upper bound for a single write on an accepted connection, in milliseconds.
    pub write_op_timeout_ms: u64,
}

impl ConnTimeoutConfig {
    pub fn op_timeouts(&self) -> OpTimeouts {
        OpTimeouts::new(
            Duration::from_millis(self.read_op_timeout_ms),
            Duration::from_millis(self.write_op_timeout_ms),
        )
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Rolling window for latency summaries, in seconds.
    pub summary_window_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            summary_window_secs: 30,
        }
    }
}

impl ObservabilityConfig {
    pub fn summary_window(&self) -> Duration {
        Duration::from_secs(self.summary_window_secs)
    }
}
