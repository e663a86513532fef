//! # Singlesock
//!
//! Disciplined access to non-shareable message endpoints.
//!
//! ## Architecture
//!
//! - **`singlesock-core`**: the transport trait, multipart messages and the
//!   in-process transport
//! - **`singlesock`**: the ownership layer (this crate)
//!
//! The layer offers three tools:
//!
//! - [`OwnedEndpoint`]: an endpoint bound to the thread that created it; calls
//!   from any other thread fail with [`Error::OwnershipViolation`]
//! - [`WorkerOwnedEndpoint`]: a dedicated thread owns the endpoint for its
//!   whole life and runs tasks other threads hand it, one at a time
//! - [`Multiplexer`] and [`proxy`]: block until any of several endpoints has
//!   data, and the two-way relay built on it
//!
//! ## Transports (opt-in via features)
//!
//! The in-process transport is always available. A libzmq backend is gated
//! behind the `zmq` feature:
//!
//! ```toml
//! [dependencies]
//! singlesock = { version = "0.1", features = ["zmq"] }
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use singlesock::{InprocContext, InprocEndpoint, SocketType, WorkerConfig, WorkerOwnedEndpoint};
//! use singlesock_core::inproc::InprocSocket;
//! use singlesock_core::options::EndpointOptions;
//!
//! # fn main() -> singlesock::Result<()> {
//! let ctx = InprocContext::new();
//!
//! let mut server = InprocEndpoint::open(&ctx, SocketType::Rep, EndpointOptions::default())?;
//! server.bind("inproc://quickstart")?;
//!
//! // A worker thread owns the client endpoint; we only hand it work.
//! let mut client = WorkerOwnedEndpoint::<InprocSocket>::spawn(
//!     &ctx,
//!     SocketType::Req,
//!     WorkerConfig::single_shot().with_connect("inproc://quickstart"),
//! )?;
//! client.wait_until_idle(None);
//! client.assign_task(|endpoint| {
//!     endpoint.send_text(&["ping"])?;
//!     let reply = endpoint.receive_text(None)?;
//!     assert_eq!(reply, Some(vec!["pong".to_string()]));
//!     Ok(())
//! })?;
//!
//! assert_eq!(server.receive_text(None)?, Some(vec!["ping".to_string()]));
//! server.send_text(&["pong"])?;
//! client.join()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! Everything logs through `tracing`; call [`dev_tracing::init_tracing`] with
//! `RUST_LOG` set to see it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dev_tracing;
pub mod error;
pub mod owned;
pub mod poller;
pub mod proxy;
pub mod worker;

#[cfg(feature = "zmq")]
pub mod zmq_backend;

pub use bytes::Bytes;
pub use singlesock_core::inproc::{InprocContext, InprocSocket};
pub use singlesock_core::message::Message;
pub use singlesock_core::options::EndpointOptions;
pub use singlesock_core::socket_type::SocketType;
pub use singlesock_core::transport::Endpoint;

pub use error::{Error, Result};
pub use owned::OwnedEndpoint;
pub use poller::{wait_for_any, Multiplexer};
pub use proxy::{proxy, Proxy, ProxyCommand, ProxyStats};
pub use worker::{StopToken, WorkerConfig, WorkerOwnedEndpoint, WorkerState};

/// Thread-owned endpoint of the in-process transport.
pub type InprocEndpoint = OwnedEndpoint<InprocSocket>;

/// Worker-owned endpoint of the in-process transport.
pub type InprocWorker = WorkerOwnedEndpoint<InprocSocket>;

#[cfg(feature = "zmq")]
pub use zmq_backend::{ZmqEndpoint, ZmqOwnedEndpoint};

/// Common imports.
pub mod prelude {
    pub use crate::{
        proxy, wait_for_any, Bytes, EndpointOptions, Error, InprocContext, InprocEndpoint,
        InprocWorker, Message, Multiplexer, OwnedEndpoint, Proxy, ProxyStats, Result, SocketType,
        WorkerConfig, WorkerOwnedEndpoint, WorkerState,
    };
}
