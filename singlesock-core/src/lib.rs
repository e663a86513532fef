//! Singlesock Core
//!
//! This crate contains the transport-level building blocks:
//! - Endpoint trait consumed by the ownership layer (`transport`)
//! - In-process transport with context termination (`inproc`)
//! - Multipart messages (`message`)
//! - Addresses, socket types and endpoint options (`address`, `socket_type`, `options`)
//! - Error payloads and classification helpers (`error`)
//! - Poison guard for interrupted multipart sends (`poison`)

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod address;
pub mod error;
pub mod inproc;
pub mod message;
pub mod options;
pub mod poison;
pub mod socket_type;
pub mod transport;

// Small prelude to make downstream crates ergonomic.
pub mod prelude {
    pub use crate::address::{Address, AddressError};
    pub use crate::error::{is_context_terminated, is_state_error, SocketStateError};
    pub use crate::inproc::{InprocContext, InprocSocket};
    pub use crate::message::{Frame, Message};
    pub use crate::options::EndpointOptions;
    pub use crate::poison::PoisonGuard;
    pub use crate::socket_type::SocketType;
    pub use crate::transport::Endpoint;
}
