//! Byte relay hosting the decorated listener.
//!
//! # Responsibilities
//! - Accept connections until shutdown is signalled
//! - Relay bytes between each accepted connection and the upstream
//! - Close the listener, then drain in-flight relays on the way out
//!
//! One task drives each connection; its two directions run concurrently, a
//! single reader and a single writer on the accepted connection.
//!
//! ```text
//! client EOF   → shut down upstream write half, keep relaying the reply
//! upstream EOF → close the client connection, relay done
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::lifecycle::ShutdownSignal;
use crate::net::{write_all, Connection, StreamListener};

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Back-off after a failed accept, so persistent failures do not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long in-flight relays may run after shutdown before they are aborted.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes moved by one relayed connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// Accept loop relaying every connection to a single upstream.
pub struct RelayServer<L> {
    listener: L,
    upstream: SocketAddr,
    connect_timeout: Duration,
    drain_timeout: Duration,
}

impl<L> RelayServer<L>
where
    L: StreamListener,
    L::Conn: 'static,
{
    pub fn new(listener: L, upstream: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            listener,
            upstream,
            connect_timeout,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` fires, then close the listener and drain.
    ///
    /// Relays still running after the drain timeout are aborted, which drops
    /// (and so closes) their connections.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> io::Result<()> {
        let mut relays = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(_) = relays.join_next(), if !relays.is_empty() => {}
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => {
                        relays.spawn(serve(conn, self.upstream, self.connect_timeout));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
            }
        }

        tracing::info!(in_flight = relays.len(), "Listener stopping");
        let closed = self.listener.close();

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while relays.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(aborted = relays.len(), "Drain timeout elapsed, aborting relays");
            relays.shutdown().await;
        }

        closed
    }
}

async fn serve<C: Connection>(conn: C, upstream: SocketAddr, connect_timeout: Duration) {
    let peer_addr = conn.peer_addr().ok();
    match relay(conn, upstream, connect_timeout).await {
        Ok(stats) => tracing::debug!(
            peer_addr = ?peer_addr,
            client_to_upstream = stats.client_to_upstream,
            upstream_to_client = stats.upstream_to_client,
            "Relay finished"
        ),
        Err(e) => tracing::debug!(
            peer_addr = ?peer_addr,
            error = %e,
            "Relay ended with error"
        ),
    }
}

/// Relay one accepted connection to `upstream` until the upstream finishes.
///
/// The accepted connection is closed on return.
pub async fn relay<C>(conn: C, upstream: SocketAddr, connect_timeout: Duration) -> io::Result<RelayStats>
where
    C: Connection,
{
    let result = relay_inner(&conn, upstream, connect_timeout).await;
    let _ = conn.close();
    result
}

async fn relay_inner<C>(
    conn: &C,
    upstream: SocketAddr,
    connect_timeout: Duration,
) -> io::Result<RelayStats>
where
    C: Connection,
{
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(upstream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "upstream connect timed out"))??;
    let (mut upstream_read, mut upstream_write) = stream.into_split();
    let sent = AtomicU64::new(0);

    let client_to_upstream = async {
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        loop {
            let n = conn.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            upstream_write.write_all(&buf[..n]).await?;
            sent.fetch_add(n as u64, Ordering::Relaxed);
        }
        upstream_write.shutdown().await
    };

    let upstream_to_client = async {
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = upstream_read.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            write_all(conn, &buf[..n]).await?;
            total += n as u64;
        }
        Ok::<_, io::Error>(total)
    };

    tokio::pin!(client_to_upstream, upstream_to_client);
    let mut client_done = false;
    let received = loop {
        tokio::select! {
            result = &mut client_to_upstream, if !client_done => {
                result?;
                client_done = true;
            }
            result = &mut upstream_to_client => break result?,
        }
    };

    Ok(RelayStats {
        client_to_upstream: sent.load(Ordering::Relaxed),
        upstream_to_client: received,
    })
}
