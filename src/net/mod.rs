//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tcp.rs (deadline-aware socket)
//!     → listener.rs (accept, wrap every connection)
//!     → timeout.rs (per-operation deadlines, latency metrics)
//!     → Hand off to the hosting server
//! ```
//!
//! # Design Decisions
//! - Decorators implement the same traits as what they wrap
//! - Deadlines are an explicit `Unset | At(instant)` type
//! - A connection that never does I/O is never timed out here

pub mod deadline;
pub mod listener;
pub mod stream;
pub mod tcp;
pub mod timeout;

pub use deadline::Deadline;
pub use listener::{ListenerError, TimeoutListener};
pub use stream::{write_all, Connection, StreamListener};
pub use tcp::{TcpConnection, TcpStreamListener};
pub use timeout::{DeadlineError, OpTimeouts, TimeoutConnection};
