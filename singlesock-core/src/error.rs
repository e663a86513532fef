//! Transport error helpers.
//!
//! Transports report failures as plain `std::io::Error` values so that callers
//! see exactly what the transport said. This module defines the payloads the
//! in-process transport attaches to those errors and the helpers used to
//! classify them.

use std::io;
use thiserror::Error;

/// Payload of the error returned by every operation on a terminated context.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("context terminated")]
pub struct ContextTerminated;

/// Operation not allowed by the socket's request/reply state machine (EFSM).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStateError {
    /// REQ sent a request and must read the reply first
    #[error("REQ socket must receive the reply before sending again")]
    ReqAwaitingReply,

    /// REQ has no outstanding request to read a reply for
    #[error("REQ socket must send a request before receiving")]
    ReqNoRequest,

    /// REP received a request and must reply first
    #[error("REP socket must reply before receiving the next request")]
    RepAwaitingReply,

    /// REP has no request to reply to
    #[error("REP socket must receive a request before replying")]
    RepNoRequest,
}

impl From<SocketStateError> for io::Error {
    fn from(err: SocketStateError) -> Self {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

/// Build the error reported after a context was terminated.
pub fn terminated() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, ContextTerminated)
}

/// Build the error reported by operations on a closed socket.
pub fn socket_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket is closed")
}

/// Check whether an error was caused by context termination.
pub fn is_context_terminated(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<ContextTerminated>())
}

/// Check whether an error is a request/reply sequencing violation.
pub fn is_state_error(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<SocketStateError>())
}

/// Check if this error is recoverable by retrying later.
pub fn is_recoverable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_is_detected() {
        let err = terminated();
        assert!(is_context_terminated(&err));
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert!(!is_context_terminated(&socket_closed()));
    }

    #[test]
    fn test_state_error_roundtrip() {
        let err: io::Error = SocketStateError::ReqAwaitingReply.into();
        assert!(is_state_error(&err));
        assert!(!is_context_terminated(&err));
        assert!(err.to_string().contains("REQ"));
    }

    #[test]
    fn test_recoverable() {
        assert!(is_recoverable(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_recoverable(&terminated()));
    }
}
