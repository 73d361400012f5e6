//! Deadline-aware TCP transport.
//!
//! Tokio sockets have no notion of a deadline, so `TcpConnection` keeps one
//! per direction and bounds each readiness wait with it. Operations take
//! `&self` and use `readable`/`try_read` (and the write equivalents) so a
//! reader and a writer can run concurrently on one socket.

use std::future::Future;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use socket2::SockRef;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use super::deadline::{Deadline, DeadlineCell};
use super::stream::{Connection, StreamListener};

/// Error returned when an operation outlives its deadline.
pub fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded")
}

fn closed_connection() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "use of closed connection")
}

/// Run `op` until it completes or `deadline` passes.
async fn bounded<T, F>(deadline: Deadline, op: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Deadline::Unset => op.await,
        Deadline::At(at) => {
            if at <= Instant::now() {
                return Err(deadline_exceeded());
            }
            match tokio::time::timeout_at(at, op).await {
                Ok(result) => result,
                Err(_) => Err(deadline_exceeded()),
            }
        }
    }
}

/// A TCP stream honouring read and write deadlines.
///
/// Each read or write takes the direction's deadline once, when it starts.
/// Setting a deadline while an operation is pending applies from the next
/// operation on; the pending one keeps the deadline it started with.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    read_deadline: DeadlineCell,
    write_deadline: DeadlineCell,
    closed: AtomicBool,
}

impl TcpConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_deadline: DeadlineCell::default(),
            write_deadline: DeadlineCell::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Open a connection to `addr`.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        TcpStream::connect(addr).await.map(Self::new)
    }

    /// Current read deadline of the socket.
    pub fn read_deadline(&self) -> Deadline {
        self.read_deadline.get()
    }

    /// Current write deadline of the socket.
    pub fn write_deadline(&self) -> Deadline {
        self.write_deadline.get()
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(closed_connection())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        bounded(self.read_deadline.get(), async {
            loop {
                self.stream.readable().await?;
                self.ensure_open()?;
                match self.stream.try_read(buf) {
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    result => return result,
                }
            }
        })
        .await
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        bounded(self.write_deadline.get(), async {
            loop {
                self.stream.writable().await?;
                self.ensure_open()?;
                match self.stream.try_write(buf) {
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    result => return result,
                }
            }
        })
        .await
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(closed_connection());
        }
        SockRef::from(&self.stream).shutdown(Shutdown::Both)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn set_deadline(&self, deadline: Deadline) -> io::Result<()> {
        self.ensure_open()?;
        self.read_deadline.set(deadline);
        self.write_deadline.set(deadline);
        Ok(())
    }

    fn set_read_deadline(&self, deadline: Deadline) -> io::Result<()> {
        self.ensure_open()?;
        self.read_deadline.set(deadline);
        Ok(())
    }

    fn set_write_deadline(&self, deadline: Deadline) -> io::Result<()> {
        self.ensure_open()?;
        self.write_deadline.set(deadline);
        Ok(())
    }
}

/// TCP listener producing `TcpConnection`s.
#[derive(Debug)]
pub struct TcpStreamListener {
    inner: TcpListener,
}

impl TcpStreamListener {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        TcpListener::bind(addr).await.map(Self::from)
    }
}

impl From<TcpListener> for TcpStreamListener {
    fn from(inner: TcpListener) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StreamListener for TcpStreamListener {
    type Conn = TcpConnection;

    async fn accept(&self) -> io::Result<TcpConnection> {
        let (stream, _) = self.inner.accept().await?;
        Ok(TcpConnection::new(stream))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn close(self) -> io::Result<()> {
        drop(self.inner);
        Ok(())
    }
}
