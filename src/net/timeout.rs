//! Per-operation read/write timeouts for accepted connections.
//!
//! # Responsibilities
//! - Bound every single read and write when the application has no deadline
//!   of its own
//! - Keep the application's view of its deadlines unchanged by the
//!   synthetic ones
//! - Report the latency of every read and write
//!
//! # State
//! ```text
//! read_deadline_unset  = last set_deadline/set_read_deadline was Unset
//! write_deadline_unset = last set_deadline/set_write_deadline was Unset
//!
//! read/write with flag set and timeout > 0:
//!     set synthetic deadline → delegate → on success clear it
//!     (on failure the synthetic deadline stays in place)
//! ```
//!
//! Both flags start as `true`: a freshly accepted connection has no deadline.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::deadline::Deadline;
use super::stream::Connection;
use crate::observability::metrics::{Direction, LatencyTimer, OpLatency};

/// Per-operation timeouts. A zero duration disables the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpTimeouts {
    pub read: Duration,
    pub write: Duration,
}

impl OpTimeouts {
    pub fn new(read: Duration, write: Duration) -> Self {
        Self { read, write }
    }

    /// No synthetic deadlines in either direction.
    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Failure to manage a synthetic deadline on the wrapped connection.
#[derive(Debug, Error)]
pub enum DeadlineError {
    #[error("set {direction} deadline to {timeout:?} failed: {source}")]
    Set {
        direction: Direction,
        timeout: Duration,
        #[source]
        source: io::Error,
    },
    /// The operation itself succeeded; `bytes` were already transferred.
    #[error("unset {direction} deadline failed: {source}")]
    Unset {
        direction: Direction,
        bytes: usize,
        #[source]
        source: io::Error,
    },
}

impl DeadlineError {
    /// Bytes read or written before the failure. Always 0 for `Set`.
    pub fn bytes(&self) -> usize {
        match self {
            DeadlineError::Set { .. } => 0,
            DeadlineError::Unset { bytes, .. } => *bytes,
        }
    }
}

impl From<DeadlineError> for io::Error {
    fn from(err: DeadlineError) -> Self {
        let kind = match &err {
            DeadlineError::Set { source, .. } | DeadlineError::Unset { source, .. } => source.kind(),
        };
        io::Error::new(kind, err)
    }
}

/// Connection wrapper applying per-operation timeouts.
pub struct TimeoutConnection<C> {
    inner: C,
    timeouts: OpTimeouts,
    latency: Arc<dyn OpLatency>,
    read_deadline_unset: AtomicBool,
    write_deadline_unset: AtomicBool,
}

impl<C: Connection> TimeoutConnection<C> {
    pub fn new(inner: C, timeouts: OpTimeouts, latency: Arc<dyn OpLatency>) -> Self {
        Self {
            inner,
            timeouts,
            latency,
            read_deadline_unset: AtomicBool::new(true),
            write_deadline_unset: AtomicBool::new(true),
        }
    }

    /// Whether the application's read deadline is currently unset.
    pub fn read_deadline_unset(&self) -> bool {
        self.read_deadline_unset.load(Ordering::Relaxed)
    }

    /// Whether the application's write deadline is currently unset.
    pub fn write_deadline_unset(&self) -> bool {
        self.write_deadline_unset.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> OpTimeouts {
        self.timeouts
    }

    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Install a synthetic deadline for one operation, if one applies.
    ///
    /// Returns whether a deadline was installed.
    fn arm(&self, direction: Direction) -> Result<bool, DeadlineError> {
        let (unset, timeout) = match direction {
            Direction::Read => (self.read_deadline_unset(), self.timeouts.read),
            Direction::Write => (self.write_deadline_unset(), self.timeouts.write),
        };
        if !unset || timeout.is_zero() {
            return Ok(false);
        }

        let deadline = Deadline::after(timeout);
        let result = match direction {
            Direction::Read => self.inner.set_read_deadline(deadline),
            Direction::Write => self.inner.set_write_deadline(deadline),
        };
        result.map_err(|source| DeadlineError::Set {
            direction,
            timeout,
            source,
        })?;
        Ok(true)
    }

    /// Clear the synthetic deadline after an operation moved `bytes`.
    fn disarm(&self, direction: Direction, bytes: usize) -> Result<(), DeadlineError> {
        let result = match direction {
            Direction::Read => self.inner.set_read_deadline(Deadline::Unset),
            Direction::Write => self.inner.set_write_deadline(Deadline::Unset),
        };
        result.map_err(|source| DeadlineError::Unset {
            direction,
            bytes,
            source,
        })
    }
}

#[async_trait]
impl<C: Connection> Connection for TimeoutConnection<C> {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let _timer = LatencyTimer::start(&*self.latency, Direction::Read);

        let armed = self.arm(Direction::Read)?;
        // A failed read leaves the synthetic deadline in place.
        let n = self.inner.read(buf).await?;
        if armed {
            self.disarm(Direction::Read, n)?;
        }
        Ok(n)
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let _timer = LatencyTimer::start(&*self.latency, Direction::Write);

        let armed = self.arm(Direction::Write)?;
        let n = self.inner.write(buf).await?;
        if armed {
            self.disarm(Direction::Write, n)?;
        }
        Ok(n)
    }

    fn close(&self) -> io::Result<()> {
        self.inner.close()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    fn set_deadline(&self, deadline: Deadline) -> io::Result<()> {
        self.read_deadline_unset
            .store(deadline.is_unset(), Ordering::Relaxed);
        self.write_deadline_unset
            .store(deadline.is_unset(), Ordering::Relaxed);
        self.inner.set_deadline(deadline)
    }

    fn set_read_deadline(&self, deadline: Deadline) -> io::Result<()> {
        self.read_deadline_unset
            .store(deadline.is_unset(), Ordering::Relaxed);
        self.inner.set_read_deadline(deadline)
    }

    fn set_write_deadline(&self, deadline: Deadline) -> io::Result<()> {
        self.write_deadline_unset
            .store(deadline.is_unset(), Ordering::Relaxed);
        self.inner.set_write_deadline(deadline)
    }
}

impl<C> std::fmt::Debug for TimeoutConnection<C>
where
    C: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutConnection")
            .field("inner", &self.inner)
            .field("timeouts", &self.timeouts)
            .field("read_deadline_unset", &self.read_deadline_unset)
            .field("write_deadline_unset", &self.write_deadline_unset)
            .finish_non_exhaustive()
    }
}
