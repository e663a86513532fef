//! The transport primitive consumed by the ownership layer.
//!
//! An [`Endpoint`] is a non-shareable communication handle: it binds or
//! connects to addresses, moves frames, and answers readiness questions. It is
//! never used from two threads at once; the ownership layer above guarantees
//! that. Endpoints that rendezvous inside one process share a [`Endpoint::Context`],
//! the only transport object that may be used from several threads.
//!
//! Timeouts follow one convention everywhere: `None` blocks indefinitely,
//! `Some(Duration::ZERO)` checks without blocking, anything else is a bounded
//! wait.

use bytes::Bytes;
use std::io;
use std::time::Duration;

use crate::options::EndpointOptions;
use crate::socket_type::SocketType;

/// Frame-level transport endpoint.
pub trait Endpoint: Sized + Send + 'static {
    /// Shared context endpoints are created from.
    type Context: Clone + Send + Sync + 'static;

    /// Create an endpoint of the given type inside `context`.
    fn open(context: &Self::Context, kind: SocketType, options: &EndpointOptions)
        -> io::Result<Self>;

    /// Messaging pattern of this endpoint.
    fn kind(&self) -> SocketType;

    /// Accept connections on `address`.
    fn bind(&mut self, address: &str) -> io::Result<()>;

    /// Connect to `address`.
    fn connect(&mut self, address: &str) -> io::Result<()>;

    /// Drop the connection previously made to `address`.
    fn disconnect(&mut self, address: &str) -> io::Result<()>;

    /// Install a prefix filter (broadcast-style endpoints only).
    fn set_subscription_filter(&mut self, filter: &[u8]) -> io::Result<()>;

    /// Write one frame; `more` tells the peer further frames follow.
    fn send_frame(&mut self, data: Bytes, more: bool) -> io::Result<()>;

    /// Read one frame, blocking until one is available.
    fn receive_frame(&mut self) -> io::Result<Bytes>;

    /// Whether the last received frame is followed by more frames of the same message.
    fn has_more_frames(&mut self) -> io::Result<bool>;

    /// Wait until a message can be read.
    fn poll_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool>;

    /// Wait until a message can be written.
    fn poll_writable(&mut self, timeout: Option<Duration>) -> io::Result<bool>;

    /// Wait until any endpoint of `set` can be read and return its index.
    ///
    /// Returns `Ok(None)` when the timeout elapses first. When several are
    /// ready, lower indices are reported first.
    fn poll_any(set: &mut [&mut Self], timeout: Option<Duration>) -> io::Result<Option<usize>>;

    /// Close the endpoint. Closing twice is not an error.
    fn close(&mut self) -> io::Result<()>;

    /// Whether [`Endpoint::close`] has run.
    fn is_closed(&self) -> bool;
}
