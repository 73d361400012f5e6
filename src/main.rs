//! TCP gateway enforcing per-operation read/write timeouts.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ TcpStreamListener ──▶ TimeoutListener ──▶ TimeoutConnection ──▶ relay ──▶ Upstream
//!                                                              │
//!                                                              └──▶ read/write latency summaries
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use proxy_conn_timeout::cli::Cli;
use proxy_conn_timeout::lifecycle::{wait_for_signal, Shutdown};
use proxy_conn_timeout::net::{StreamListener, TimeoutListener};
use proxy_conn_timeout::observability::{logging, metrics};
use proxy_conn_timeout::relay::RelayServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!("proxy-conn-timeout v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        read_op_timeout_ms = config.timeouts.read_op_timeout_ms,
        write_op_timeout_ms = config.timeouts.write_op_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr, config.observability.summary_window())?;
    }

    let listener = TimeoutListener::bind(&config, Arc::new(metrics::PrometheusOpLatency)).await?;
    let local_addr = listener.local_addr()?;
    let upstream: SocketAddr = config.upstream.address.parse()?;

    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = RelayServer::new(listener, upstream, config.upstream.connect_timeout());
    let server_task = tokio::spawn(server.run(shutdown.subscribe()));

    match wait_for_signal().await {
        Ok(signal) => tracing::info!(signal, "Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
