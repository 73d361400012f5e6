//! Deadline representation for stream operations.
//!
//! A deadline is an absolute point in time after which a pending read or
//! write fails. `Deadline::Unset` means the operation may block forever.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Absolute deadline for one direction of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    /// No deadline; operations block until they complete.
    #[default]
    Unset,
    /// Operations fail once this instant has passed.
    At(Instant),
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline::At(Instant::now() + timeout)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Deadline::Unset)
    }

    /// The instant this deadline expires at, if any.
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::Unset => None,
            Deadline::At(at) => Some(*at),
        }
    }

    /// Whether the deadline has already passed.
    pub fn has_expired(&self) -> bool {
        match self {
            Deadline::Unset => false,
            Deadline::At(at) => *at <= Instant::now(),
        }
    }
}

impl From<Option<Instant>> for Deadline {
    fn from(value: Option<Instant>) -> Self {
        value.map_or(Deadline::Unset, Deadline::At)
    }
}

impl From<Instant> for Deadline {
    fn from(value: Instant) -> Self {
        Deadline::At(value)
    }
}

/// Shared, mutable deadline slot for one direction of a transport.
#[derive(Debug, Default)]
pub struct DeadlineCell {
    inner: Mutex<Deadline>,
}

impl DeadlineCell {
    pub fn get(&self) -> Deadline {
        *self.inner.lock().expect("deadline mutex poisoned")
    }

    pub fn set(&self, deadline: Deadline) {
        *self.inner.lock().expect("deadline mutex poisoned") = deadline;
    }
}
