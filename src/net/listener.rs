//! Listener that wraps every accepted connection with per-operation timeouts.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming connections and wrap each in a `TimeoutConnection`
//! - Propagate accept and close errors unchanged

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use super::stream::{Connection, StreamListener};
use super::tcp::TcpStreamListener;
use super::timeout::{OpTimeouts, TimeoutConnection};
use crate::config::GatewayConfig;
use crate::observability::metrics::OpLatency;

/// Error type for binding the listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Bind address did not parse.
    #[error("invalid bind address {address:?}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),
}

/// Decorates a `StreamListener` so no connection escapes unwrapped.
pub struct TimeoutListener<L> {
    inner: L,
    timeouts: OpTimeouts,
    latency: Arc<dyn OpLatency>,
}

impl<L: StreamListener> TimeoutListener<L> {
    pub fn new(inner: L, timeouts: OpTimeouts, latency: Arc<dyn OpLatency>) -> Self {
        Self {
            inner,
            timeouts,
            latency,
        }
    }

    pub fn timeouts(&self) -> OpTimeouts {
        self.timeouts
    }

    pub fn get_ref(&self) -> &L {
        &self.inner
    }
}

impl TimeoutListener<TcpStreamListener> {
    /// Bind the configured address with the configured operation timeouts.
    pub async fn bind(
        config: &GatewayConfig,
        latency: Arc<dyn OpLatency>,
    ) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .listener
            .bind_address
            .parse()
            .map_err(|source| ListenerError::Address {
                address: config.listener.bind_address.clone(),
                source,
            })?;

        let listener = TcpStreamListener::bind(addr)
            .await
            .map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let timeouts = config.timeouts.op_timeouts();

        tracing::info!(
            address = %local_addr,
            read_op_timeout_ms = timeouts.read.as_millis() as u64,
            write_op_timeout_ms = timeouts.write.as_millis() as u64,
            "Listener bound"
        );

        Ok(Self::new(listener, timeouts, latency))
    }
}

#[async_trait]
impl<L: StreamListener> StreamListener for TimeoutListener<L> {
    type Conn = TimeoutConnection<L::Conn>;

    async fn accept(&self) -> io::Result<Self::Conn> {
        let conn = self.inner.accept().await?;
        if let Ok(peer_addr) = conn.peer_addr() {
            tracing::debug!(peer_addr = %peer_addr, "Connection accepted");
        }
        Ok(TimeoutConnection::new(
            conn,
            self.timeouts,
            Arc::clone(&self.latency),
        ))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn close(self) -> io::Result<()> {
        self.inner.close()
    }
}
