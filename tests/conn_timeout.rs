//! Per-operation timeout behaviour over real loopback sockets.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

use proxy_conn_timeout::net::{Connection, Deadline, OpTimeouts};

mod common;

fn read_timeout(ms: u64) -> OpTimeouts {
    OpTimeouts::new(Duration::from_millis(ms), Duration::ZERO)
}

#[tokio::test]
async fn silent_peer_read_times_out() {
    let (conn, _client, latency) = common::connected_pair(read_timeout(100)).await;

    let start = Instant::now();
    let err = conn.read(&mut [0u8; 64]).await.unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(elapsed >= Duration::from_millis(100), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");

    let reads = latency.reads();
    assert_eq!(reads.len(), 1);
    assert!(reads[0] >= Duration::from_millis(100));
}

#[tokio::test]
async fn disabled_timeout_blocks_on_silent_peer() {
    let (conn, _client, latency) = common::connected_pair(OpTimeouts::disabled()).await;

    let outcome = tokio::time::timeout(Duration::from_millis(300), conn.read(&mut [0u8; 64])).await;
    assert!(outcome.is_err(), "read completed without data: {outcome:?}");
    assert_eq!(latency.reads().len(), 1);
    assert!(conn.get_ref().read_deadline().is_unset());
}

#[tokio::test]
async fn application_deadline_overrides_operation_timeout() {
    let (conn, mut client, _latency) = common::connected_pair(read_timeout(50)).await;
    conn.set_read_deadline(Deadline::after(Duration::from_secs(3600)))
        .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        client.write_all(b"late").await.unwrap();
        client
    });

    let mut buf = [0u8; 4];
    let n = conn.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"late");
    assert!(!conn.read_deadline_unset());
}

#[tokio::test]
async fn synthetic_deadline_is_cleared_after_success() {
    let (conn, mut client, _latency) = common::connected_pair(read_timeout(50)).await;

    client.write_all(b"first").await.unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(conn.read(&mut buf).await.unwrap(), 5);

    assert!(conn.read_deadline_unset());
    assert!(conn.get_ref().read_deadline().is_unset());

    // Idle time between operations does not count against the next read.
    tokio::time::sleep(Duration::from_millis(120)).await;
    client.write_all(b"again").await.unwrap();
    assert_eq!(conn.read(&mut buf).await.unwrap(), 5);
}

#[tokio::test]
async fn every_stalled_read_is_bounded() {
    let (conn, mut client, latency) = common::connected_pair(read_timeout(40)).await;

    for _ in 0..3 {
        let err = conn.read(&mut [0u8; 8]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(conn.read_deadline_unset());
    }

    // The expired synthetic deadline is replaced by a fresh one on the next read.
    client.write_all(b"ok").await.unwrap();
    let mut buf = [0u8; 2];
    assert_eq!(conn.read(&mut buf).await.unwrap(), 2);
    assert_eq!(latency.reads().len(), 4);
}

#[tokio::test]
async fn write_to_stalled_peer_times_out() {
    let timeouts = OpTimeouts::new(Duration::ZERO, Duration::from_millis(50));
    let (conn, _client, latency) = common::connected_pair(timeouts).await;

    // The client never reads, so the socket buffers eventually fill.
    let chunk = vec![0u8; 64 * 1024];
    let mut err = None;
    for _ in 0..100_000 {
        if let Err(e) = conn.write(&chunk).await {
            err = Some(e);
            break;
        }
    }

    let err = err.expect("write never blocked");
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);

    let writes = latency.writes();
    let last = *writes.last().unwrap();
    assert!(last >= Duration::from_millis(50), "last write took {last:?}");
    assert!(last < Duration::from_secs(2), "last write took {last:?}");
    assert!(latency.reads().is_empty());
}

#[tokio::test]
async fn concurrent_read_and_write_share_connection() {
    let timeouts = OpTimeouts::new(Duration::from_millis(500), Duration::from_millis(500));
    let (conn, client, latency) = common::connected_pair(timeouts).await;
    let (mut client_read, mut client_write) = client.into_split();

    let reader = async {
        let mut buf = [0u8; 5];
        let n = conn.read(&mut buf).await?;
        Ok::<_, io::Error>(buf[..n].to_vec())
    };
    let writer = async { conn.write(b"hello").await };
    let peer = async {
        client_write.write_all(b"world").await.unwrap();
        let mut buf = [0u8; 5];
        client_read.read_exact(&mut buf).await.unwrap();
        buf
    };

    let (read, written, echoed) = tokio::join!(reader, writer, peer);
    assert_eq!(read.unwrap(), b"world");
    assert_eq!(written.unwrap(), 5);
    assert_eq!(&echoed, b"hello");
    assert_eq!(latency.reads().len(), 1);
    assert_eq!(latency.writes().len(), 1);
}

#[tokio::test]
async fn close_is_delegated() {
    let (conn, mut client, _latency) = common::connected_pair(read_timeout(100)).await;
    conn.close().unwrap();

    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    assert_eq!(
        conn.read(&mut buf).await.unwrap_err().kind(),
        io::ErrorKind::NotConnected
    );
}
