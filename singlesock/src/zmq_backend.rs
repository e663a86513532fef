//! libzmq-backed endpoint.
//!
//! [`ZmqEndpoint`] implements the transport trait on top of the `zmq` crate, so
//! the ownership layer, workers and proxy run unchanged over `tcp://`,
//! `ipc://` and `inproc://` through libzmq. The shared context is a
//! `zmq::Context`. Every socket holds its own reference to it, so dropping the
//! caller's clones does not terminate it while sockets are open; only
//! `zmq::Context::destroy` does. After that, blocked calls fail with an error
//! for which
//! [`is_context_terminated`](singlesock_core::error::is_context_terminated)
//! holds.
//!
//! Enabled by the `zmq` feature.

use std::fmt;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use singlesock_core::error;
use singlesock_core::options::{timeout_to_millis, EndpointOptions};
use singlesock_core::socket_type::SocketType;
use singlesock_core::transport::Endpoint;
use tracing::debug;

use crate::owned::OwnedEndpoint;

/// Thread-owned libzmq endpoint.
pub type ZmqOwnedEndpoint = OwnedEndpoint<ZmqEndpoint>;

/// libzmq socket adapted to the transport trait.
pub struct ZmqEndpoint {
    socket: Option<zmq::Socket>,
    kind: SocketType,
}

impl ZmqEndpoint {
    fn socket(&self) -> io::Result<&zmq::Socket> {
        self.socket.as_ref().ok_or_else(error::socket_closed)
    }

    fn poll_one(&self, events: zmq::PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
        let socket = self.socket()?;
        let mut items = [socket.as_poll_item(events)];
        zmq::poll(&mut items, timeout_to_millis(timeout)).map_err(to_io)?;
        Ok(if events == zmq::POLLIN {
            items[0].is_readable()
        } else {
            items[0].is_writable()
        })
    }
}

impl Endpoint for ZmqEndpoint {
    type Context = zmq::Context;

    fn open(context: &zmq::Context, kind: SocketType, options: &EndpointOptions) -> io::Result<Self> {
        let socket = context.socket(zmq_type(kind)).map_err(to_io)?;
        // Pending messages are discarded on close.
        socket.set_linger(0).map_err(to_io)?;
        if let Some(routing_id) = &options.routing_id {
            EndpointOptions::validate_routing_id(routing_id)?;
            socket.set_identity(routing_id).map_err(to_io)?;
        }
        for filter in &options.subscriptions {
            socket.set_subscribe(filter).map_err(to_io)?;
        }
        debug!("[ZMQ] opened {} socket", kind);
        Ok(Self {
            socket: Some(socket),
            kind,
        })
    }

    fn kind(&self) -> SocketType {
        self.kind
    }

    fn bind(&mut self, address: &str) -> io::Result<()> {
        self.socket()?.bind(address).map_err(to_io)
    }

    fn connect(&mut self, address: &str) -> io::Result<()> {
        self.socket()?.connect(address).map_err(to_io)
    }

    fn disconnect(&mut self, address: &str) -> io::Result<()> {
        self.socket()?.disconnect(address).map_err(to_io)
    }

    fn set_subscription_filter(&mut self, filter: &[u8]) -> io::Result<()> {
        self.socket()?.set_subscribe(filter).map_err(to_io)
    }

    fn send_frame(&mut self, data: Bytes, more: bool) -> io::Result<()> {
        let flags = if more { zmq::SNDMORE } else { 0 };
        self.socket()?.send(data.as_ref(), flags).map_err(to_io)
    }

    fn receive_frame(&mut self) -> io::Result<Bytes> {
        self.socket()?.recv_bytes(0).map(Bytes::from).map_err(to_io)
    }

    fn has_more_frames(&mut self) -> io::Result<bool> {
        self.socket()?.get_rcvmore().map_err(to_io)
    }

    fn poll_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        self.poll_one(zmq::POLLIN, timeout)
    }

    fn poll_writable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        self.poll_one(zmq::POLLOUT, timeout)
    }

    fn poll_any(set: &mut [&mut Self], timeout: Option<Duration>) -> io::Result<Option<usize>> {
        let mut items = Vec::with_capacity(set.len());
        for endpoint in set.iter() {
            items.push(endpoint.socket()?.as_poll_item(zmq::POLLIN));
        }
        zmq::poll(&mut items, timeout_to_millis(timeout)).map_err(to_io)?;
        Ok(items.iter().position(|item| item.is_readable()))
    }

    fn close(&mut self) -> io::Result<()> {
        if self.socket.take().is_some() {
            debug!("[ZMQ] closed {} socket", self.kind);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.socket.is_none()
    }
}

impl fmt::Debug for ZmqEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZmqEndpoint")
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn zmq_type(kind: SocketType) -> zmq::SocketType {
    match kind {
        SocketType::Pair => zmq::PAIR,
        SocketType::Pub => zmq::PUB,
        SocketType::Sub => zmq::SUB,
        SocketType::Req => zmq::REQ,
        SocketType::Rep => zmq::REP,
        SocketType::Dealer => zmq::DEALER,
        SocketType::Router => zmq::ROUTER,
        SocketType::Pull => zmq::PULL,
        SocketType::Push => zmq::PUSH,
    }
}

fn to_io(err: zmq::Error) -> io::Error {
    match err {
        zmq::Error::ETERM => error::terminated(),
        zmq::Error::EAGAIN => io::Error::new(io::ErrorKind::WouldBlock, err),
        zmq::Error::EINTR => io::Error::new(io::ErrorKind::Interrupted, err),
        zmq::Error::EADDRINUSE => io::Error::new(io::ErrorKind::AddrInUse, err),
        zmq::Error::ENOENT => io::Error::new(io::ErrorKind::NotFound, err),
        zmq::Error::EINVAL | zmq::Error::EPROTONOSUPPORT => {
            io::Error::new(io::ErrorKind::InvalidInput, err)
        }
        _ => io::Error::new(io::ErrorKind::Other, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(error::is_context_terminated(&to_io(zmq::Error::ETERM)));
        assert_eq!(to_io(zmq::Error::EAGAIN).kind(), io::ErrorKind::WouldBlock);
        assert_eq!(to_io(zmq::Error::EADDRINUSE).kind(), io::ErrorKind::AddrInUse);
    }

    #[test]
    fn test_inproc_pair_through_libzmq() {
        let ctx = zmq::Context::new();
        let options = EndpointOptions::default();
        let mut server = ZmqEndpoint::open(&ctx, SocketType::Pair, &options).unwrap();
        server.bind("inproc://zmq-backend-unit").unwrap();
        let mut client = ZmqEndpoint::open(&ctx, SocketType::Pair, &options).unwrap();
        client.connect("inproc://zmq-backend-unit").unwrap();

        client.send_frame(Bytes::from_static(b"a"), true).unwrap();
        client.send_frame(Bytes::from_static(b"b"), false).unwrap();

        assert!(server.poll_readable(Some(Duration::from_secs(1))).unwrap());
        assert_eq!(server.receive_frame().unwrap(), Bytes::from_static(b"a"));
        assert!(server.has_more_frames().unwrap());
        assert_eq!(server.receive_frame().unwrap(), Bytes::from_static(b"b"));
        assert!(!server.has_more_frames().unwrap());

        server.close().unwrap();
        server.close().unwrap();
        assert!(server.receive_frame().is_err());
    }
}
