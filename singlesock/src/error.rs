//! Singlesock error types.
//!
//! Errors raised by the ownership layer itself are their own variants; anything
//! the transport reports is carried through unchanged as [`Error::Transport`].

use std::io;
use std::thread::ThreadId;
use thiserror::Error;

use crate::worker::WorkerState;

/// Main error type for singlesock operations
#[derive(Error, Debug)]
pub enum Error {
    /// Operation invoked from a thread that does not own the endpoint
    #[error("{operation} called from thread {caller:?}, endpoint is owned by {owner:?}")]
    OwnershipViolation {
        /// Rejected operation
        operation: &'static str,
        /// Thread that created the endpoint
        owner: ThreadId,
        /// Thread that made the call
        caller: ThreadId,
    },

    /// Endpoint was not writable within the send timeout
    #[error("endpoint not writable, message rejected")]
    SendRejected,

    /// Task handed to a worker that is not idle
    #[error("worker is not idle (state: {0})")]
    ThreadNotIdle(WorkerState),

    /// Worker thread tried to join itself
    #[error("worker thread cannot join itself")]
    SelfJoin,

    /// Worker task panicked
    #[error("worker task panicked: {0}")]
    WorkerPanicked(String),

    /// Endpoint already closed
    #[error("endpoint is closed")]
    Closed,

    /// A multipart send failed part-way; the endpoint must be reopened
    #[error("endpoint poisoned by an interrupted multipart send")]
    Poisoned,

    /// Message without frames
    #[error("cannot send an empty message")]
    EmptyMessage,

    /// Multiplexer called with no endpoints
    #[error("wait set is empty")]
    EmptyWaitSet,

    /// Error reported by the transport
    #[error(transparent)]
    Transport(#[from] io::Error),
}

/// Result type alias for singlesock operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if retrying the operation later can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SendRejected | Self::ThreadNotIdle(_) => true,
            Self::Transport(err) => singlesock_core::error::is_recoverable(err),
            _ => false,
        }
    }

    /// Check if the error means the shared context was terminated.
    pub fn is_context_terminated(&self) -> bool {
        matches!(self, Self::Transport(err) if singlesock_core::error::is_context_terminated(err))
    }

    /// Check if the error is a caller bug rather than a runtime condition.
    pub fn is_ownership_violation(&self) -> bool {
        matches!(self, Self::OwnershipViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::SendRejected.is_recoverable());
        assert!(Error::ThreadNotIdle(WorkerState::Running).is_recoverable());
        assert!(!Error::Poisoned.is_recoverable());
        assert!(!Error::SelfJoin.is_recoverable());

        let terminated = Error::from(singlesock_core::error::terminated());
        assert!(terminated.is_context_terminated());
        assert!(!terminated.is_recoverable());

        let would_block = Error::from(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(would_block.is_recoverable());
    }

    #[test]
    fn test_transport_is_transparent() {
        let err = Error::from(io::Error::new(io::ErrorKind::AddrInUse, "taken"));
        assert_eq!(err.to_string(), "taken");
    }

    #[test]
    fn test_ownership_message() {
        let owner = std::thread::current().id();
        let caller = std::thread::spawn(|| std::thread::current().id()).join().unwrap();
        let err = Error::OwnershipViolation {
            operation: "send",
            owner,
            caller,
        };
        assert!(err.is_ownership_violation());
        assert!(err.to_string().starts_with("send called from thread"));
    }
}
