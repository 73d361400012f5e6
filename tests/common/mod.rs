//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use proxy_conn_timeout::net::{
    OpTimeouts, StreamListener, TcpConnection, TcpStreamListener, TimeoutConnection,
    TimeoutListener,
};
use proxy_conn_timeout::OpLatency;

/// Latency sink remembering every observation.
#[derive(Debug, Default)]
pub struct RecordingLatency {
    reads: Mutex<Vec<Duration>>,
    writes: Mutex<Vec<Duration>>,
}

impl RecordingLatency {
    pub fn reads(&self) -> Vec<Duration> {
        self.reads.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn writes(&self) -> Vec<Duration> {
        self.writes.lock().unwrap().clone()
    }
}

impl OpLatency for RecordingLatency {
    fn observe_read(&self, start: Instant) {
        self.reads.lock().unwrap().push(start.elapsed());
    }

    fn observe_write(&self, start: Instant) {
        self.writes.lock().unwrap().push(start.elapsed());
    }
}

/// Bind a decorated loopback listener.
pub async fn timeout_listener(
    timeouts: OpTimeouts,
) -> (TimeoutListener<TcpStreamListener>, Arc<RecordingLatency>) {
    let latency = Arc::new(RecordingLatency::default());
    let inner = TcpStreamListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    (TimeoutListener::new(inner, timeouts, latency.clone()), latency)
}

/// A decorated server-side connection plus the raw client socket talking to it.
#[allow(dead_code)]
pub async fn connected_pair(
    timeouts: OpTimeouts,
) -> (
    TimeoutConnection<TcpConnection>,
    TcpStream,
    Arc<RecordingLatency>,
) {
    let (listener, latency) = timeout_listener(timeouts).await;
    let addr: SocketAddr = listener.local_addr().unwrap();
    let (accepted, client) = tokio::join!(listener.accept(), TcpStream::connect(addr));
    (accepted.unwrap(), client.unwrap(), latency)
}
