//! Stream connection and listener abstractions.
//!
//! Decorators and transports in this crate speak these traits, so a wrapped
//! connection presents the same surface as the one it wraps.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;

use super::deadline::Deadline;

/// An ordered, reliable byte stream with per-direction deadlines.
///
/// Methods take `&self`: one task may read while another writes. Concurrent
/// reads (or concurrent writes) on the same connection are not supported.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Read into `buf`, returning the number of bytes read. `Ok(0)` is EOF.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write from `buf`, returning the number of bytes written.
    async fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Close the connection. Pending reads and writes are woken.
    fn close(&self) -> io::Result<()>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Set both the read and the write deadline.
    fn set_deadline(&self, deadline: Deadline) -> io::Result<()>;

    fn set_read_deadline(&self, deadline: Deadline) -> io::Result<()>;

    fn set_write_deadline(&self, deadline: Deadline) -> io::Result<()>;
}

/// Source of accepted connections.
#[async_trait]
pub trait StreamListener: Send + Sync {
    type Conn: Connection;

    /// Wait for the next connection.
    async fn accept(&self) -> io::Result<Self::Conn>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Stop listening and release the socket.
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// Write the whole buffer, looping over short writes.
pub async fn write_all<C>(conn: &C, mut buf: &[u8]) -> io::Result<()>
where
    C: Connection + ?Sized,
{
    while !buf.is_empty() {
        match conn.write(buf).await {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
