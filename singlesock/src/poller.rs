//! Waiting on several endpoints at once.
//!
//! A [`Multiplexer`] blocks until any endpoint of a wait set has a message and
//! reports which one. It does not consume the message: the caller receives it
//! from the reported endpoint. Every endpoint in the set must be owned by the
//! calling thread.
//!
//! Scanning starts just after the index returned last time, so a steadily busy
//! endpoint cannot starve the others.
//!
//! ```rust
//! use singlesock::{InprocContext, InprocEndpoint, Multiplexer, SocketType};
//! use singlesock_core::options::EndpointOptions;
//!
//! # fn main() -> singlesock::Result<()> {
//! let ctx = InprocContext::new();
//! let mut left = InprocEndpoint::open(&ctx, SocketType::Pull, EndpointOptions::default())?;
//! let mut right = InprocEndpoint::open(&ctx, SocketType::Pull, EndpointOptions::default())?;
//! left.bind("inproc://doc-left")?;
//! right.bind("inproc://doc-right")?;
//!
//! let mut pusher = InprocEndpoint::open(&ctx, SocketType::Push, EndpointOptions::default())?;
//! pusher.connect("inproc://doc-right")?;
//! pusher.send_text(&["hi"])?;
//!
//! let mut mux = Multiplexer::new();
//! let ready = mux.wait_for_any(&mut [&mut left, &mut right])?;
//! assert_eq!(ready, 1);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use singlesock_core::transport::Endpoint;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::owned::OwnedEndpoint;

/// Readiness multiplexer over endpoints owned by the calling thread.
#[derive(Debug, Default, Clone)]
pub struct Multiplexer {
    /// Index scanning starts from on the next call
    cursor: usize,
}

impl Multiplexer {
    /// Create a multiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until one endpoint of `set` has a message and return its index.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyWaitSet`] for an empty set
    /// - [`Error::OwnershipViolation`] if any endpoint belongs to another thread
    /// - [`Error::Closed`] if any endpoint is closed
    /// - [`Error::Transport`] when the underlying readiness wait fails,
    ///   including context termination
    pub fn wait_for_any<E: Endpoint>(&mut self, set: &mut [&mut OwnedEndpoint<E>]) -> Result<usize> {
        loop {
            if let Some(index) = self.poll(set, None)? {
                return Ok(index);
            }
        }
    }

    /// Wait at most `timeout` (`None` = forever) for one endpoint of `set` to
    /// have a message. Returns `Ok(None)` when the timeout elapses first.
    pub fn poll<E: Endpoint>(
        &mut self,
        set: &mut [&mut OwnedEndpoint<E>],
        timeout: Option<Duration>,
    ) -> Result<Option<usize>> {
        if set.is_empty() {
            return Err(Error::EmptyWaitSet);
        }
        for endpoint in set.iter() {
            endpoint.check_owner("wait_for_any")?;
            endpoint.ensure_open()?;
        }

        let len = set.len();
        let start = self.cursor % len;
        let (head, tail) = set.split_at_mut(start);
        let mut rotated: Vec<&mut E> = tail
            .iter_mut()
            .chain(head.iter_mut())
            .map(|endpoint| endpoint.endpoint_mut())
            .collect();

        let ready = E::poll_any(&mut rotated, timeout).map_err(|err| {
            if singlesock_core::error::is_context_terminated(&err) {
                debug!("[POLLER] context terminated while waiting on {} endpoints", len);
            } else {
                error!("[POLLER] waiting on {} endpoints failed: {}", len, err);
            }
            Error::from(err)
        })?;

        Ok(ready.map(|offset| {
            let index = (start + offset) % len;
            self.cursor = index + 1;
            trace!("[POLLER] endpoint {} of {} ready", index, len);
            index
        }))
    }
}

/// One-off [`Multiplexer::wait_for_any`] without fairness state.
pub fn wait_for_any<E: Endpoint>(set: &mut [&mut OwnedEndpoint<E>]) -> Result<usize> {
    Multiplexer::new().wait_for_any(set)
}
