//! Thread-owned endpoint.
//!
//! [`OwnedEndpoint`] wraps one transport endpoint and remembers the thread that
//! created it. Every operation first checks that it runs on that thread and
//! fails with [`Error::OwnershipViolation`] otherwise, so a non-shareable
//! endpoint is never touched concurrently. No lock protects the endpoint.
//!
//! The handle is `Send`, so it can be moved to another thread, but every call
//! made there is rejected: ownership is fixed at construction. It is neither
//! `Sync` nor `Clone`.
//!
//! ```rust
//! use singlesock::{InprocContext, InprocEndpoint, Message, SocketType};
//! use singlesock_core::options::EndpointOptions;
//!
//! # fn main() -> singlesock::Result<()> {
//! let ctx = InprocContext::new();
//! let mut server = InprocEndpoint::open(&ctx, SocketType::Pair, EndpointOptions::default())?;
//! server.bind("inproc://doc-owned")?;
//! let mut client = InprocEndpoint::open(&ctx, SocketType::Pair, EndpointOptions::default())?;
//! client.connect("inproc://doc-owned")?;
//!
//! client.send(Message::from_strs(&["hello", "world"]))?;
//! let message = server.receive(None)?.expect("blocking receive returns a message");
//! assert_eq!(message.to_strings_lossy(), vec!["hello", "world"]);
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::thread::{self, ThreadId};
use std::time::Duration;

use singlesock_core::message::Message;
use singlesock_core::options::EndpointOptions;
use singlesock_core::poison::PoisonGuard;
use singlesock_core::socket_type::SocketType;
use singlesock_core::transport::Endpoint;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

/// Endpoint bound to the thread that created it.
pub struct OwnedEndpoint<E: Endpoint> {
    endpoint: E,
    owner: ThreadId,
    context: E::Context,
    options: EndpointOptions,
    poisoned: bool,
    // Send but !Sync
    _not_sync: PhantomData<Cell<()>>,
}

impl<E: Endpoint> OwnedEndpoint<E> {
    /// Create an endpoint of type `kind`; the calling thread becomes its owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport cannot create the endpoint,
    /// for example because the context was terminated.
    pub fn open(context: &E::Context, kind: SocketType, options: EndpointOptions) -> Result<Self> {
        let endpoint = E::open(context, kind, &options)?;
        let owner = thread::current().id();
        debug!("[OWNED] opened {} endpoint owned by {:?}", kind, owner);
        Ok(Self {
            endpoint,
            owner,
            context: context.clone(),
            options,
            poisoned: false,
            _not_sync: PhantomData,
        })
    }

    /// Bind the endpoint to `address`.
    pub fn bind(&mut self, address: &str) -> Result<()> {
        self.check_owner("bind")?;
        self.ensure_open()?;
        self.endpoint.bind(address)?;
        Ok(())
    }

    /// Connect the endpoint to `address`.
    pub fn connect(&mut self, address: &str) -> Result<()> {
        self.check_owner("connect")?;
        self.ensure_open()?;
        self.endpoint.connect(address)?;
        Ok(())
    }

    /// Drop a connection made with [`OwnedEndpoint::connect`].
    pub fn disconnect(&mut self, address: &str) -> Result<()> {
        self.check_owner("disconnect")?;
        self.ensure_open()?;
        self.endpoint.disconnect(address)?;
        Ok(())
    }

    /// Install a prefix filter on a subscriber endpoint. An empty filter
    /// receives everything.
    pub fn subscribe(&mut self, filter: impl AsRef<[u8]>) -> Result<()> {
        self.check_owner("subscribe")?;
        self.ensure_open()?;
        self.endpoint.set_subscription_filter(filter.as_ref())?;
        Ok(())
    }

    /// Send a multipart message.
    ///
    /// The endpoint must become writable within the configured send timeout
    /// (`None` waits indefinitely), otherwise the message is rejected with
    /// [`Error::SendRejected`] and nothing is written. Frames are written in
    /// order, every frame but the last flagged as continued.
    ///
    /// # Errors
    ///
    /// - [`Error::OwnershipViolation`] when called off the owner thread
    /// - [`Error::EmptyMessage`] for a message without frames
    /// - [`Error::Poisoned`] after an earlier send failed part-way
    /// - [`Error::Transport`] for anything the transport reports
    pub fn send(&mut self, message: impl Into<Message>) -> Result<()> {
        self.check_owner("send")?;
        self.ensure_open()?;
        if self.poisoned {
            return Err(Error::Poisoned);
        }

        let message = message.into();
        if message.is_empty() {
            return Err(Error::EmptyMessage);
        }

        if !self.endpoint.poll_writable(self.options.send_timeout)? {
            debug!(
                "[OWNED] {} endpoint not writable, rejecting {} frames",
                self.endpoint.kind(),
                message.len()
            );
            return Err(Error::SendRejected);
        }

        let mut parts = message.parts();
        // A failing first frame leaves nothing half-written behind.
        if let Some(first) = parts.next() {
            self.endpoint.send_frame(first.data, first.more)?;
        }
        let guard = PoisonGuard::new(&mut self.poisoned);
        for frame in parts {
            self.endpoint.send_frame(frame.data, frame.more)?;
        }
        guard.disarm();

        trace!("[OWNED] sent {} frames", message.len());
        Ok(())
    }

    /// Send a text message, one frame per string.
    pub fn send_text<S: AsRef<str>>(&mut self, parts: &[S]) -> Result<()> {
        self.send(Message::from_strs(parts))
    }

    /// Receive one complete message.
    ///
    /// `None` blocks until a message arrives; `Some(timeout)` waits at most that
    /// long and returns `Ok(None)` if nothing arrived.
    pub fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Message>> {
        self.check_owner("receive")?;
        self.ensure_open()?;

        if timeout.is_some() && !self.endpoint.poll_readable(timeout)? {
            return Ok(None);
        }
        self.read_message().map(Some)
    }

    /// Receive with the endpoint's configured receive timeout.
    pub fn receive_default(&mut self) -> Result<Option<Message>> {
        self.receive(self.options.recv_timeout)
    }

    /// Receive a message and decode every frame as (lossy) UTF-8.
    pub fn receive_text(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<String>>> {
        Ok(self.receive(timeout)?.map(|message| message.to_strings_lossy()))
    }

    /// Wait until a message can be received, without consuming it.
    pub fn wait_readable(&mut self, timeout: Option<Duration>) -> Result<bool> {
        self.check_owner("wait_readable")?;
        self.ensure_open()?;
        Ok(self.endpoint.poll_readable(timeout)?)
    }

    /// Receive messages on the calling thread and hand each to `handler` until
    /// it returns [`ControlFlow::Break`].
    ///
    /// The handler gets the endpoint back, so a server can reply in place:
    ///
    /// ```rust
    /// use std::ops::ControlFlow;
    /// use singlesock::{InprocContext, InprocEndpoint, SocketType};
    /// use singlesock_core::options::EndpointOptions;
    ///
    /// # fn main() -> singlesock::Result<()> {
    /// let ctx = InprocContext::new();
    /// let mut rep = InprocEndpoint::open(&ctx, SocketType::Rep, EndpointOptions::default())?;
    /// rep.bind("inproc://doc-serve")?;
    /// let mut req = InprocEndpoint::open(&ctx, SocketType::Req, EndpointOptions::default())?;
    /// req.connect("inproc://doc-serve")?;
    /// req.send_text(&["ping"])?;
    ///
    /// rep.serve(|rep, request| {
    ///     rep.send(request)?;
    ///     Ok(ControlFlow::Break(()))
    /// })?;
    /// assert_eq!(req.receive_text(None)?, Some(vec!["ping".to_string()]));
    /// # Ok(())
    /// # }
    /// ```
    pub fn serve<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&mut Self, Message) -> Result<ControlFlow<()>>,
    {
        self.check_owner("serve")?;
        loop {
            self.ensure_open()?;
            let message = self.read_message()?;
            if handler(self, message)?.is_break() {
                return Ok(());
            }
        }
    }

    /// Close the endpoint. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.check_owner("close")?;
        if self.endpoint.is_closed() {
            return Ok(());
        }
        self.endpoint.close()?;
        debug!("[OWNED] closed {} endpoint", self.endpoint.kind());
        Ok(())
    }

    /// Thread that owns this endpoint.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Whether the calling thread is the owner.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Messaging pattern of the endpoint.
    pub fn kind(&self) -> SocketType {
        self.endpoint.kind()
    }

    /// Shared context the endpoint was created from.
    pub fn context(&self) -> &E::Context {
        &self.context
    }

    /// Options the endpoint was opened with.
    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    /// Whether [`OwnedEndpoint::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    /// Whether a multipart send failed part-way.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn check_owner(&self, operation: &'static str) -> Result<()> {
        let caller = thread::current().id();
        if caller == self.owner {
            return Ok(());
        }
        error!(
            "[OWNED] ownership violation: {} on {} endpoint from {:?}, owner is {:?}",
            operation,
            self.endpoint.kind(),
            caller,
            self.owner
        );
        Err(Error::OwnershipViolation {
            operation,
            owner: self.owner,
            caller,
        })
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.endpoint.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    fn read_message(&mut self) -> Result<Message> {
        let mut message = Message::new();
        loop {
            let frame = self.endpoint.receive_frame()?;
            message.push_frame(frame);
            if !self.endpoint.has_more_frames()? {
                trace!("[OWNED] received {} frames", message.len());
                return Ok(message);
            }
        }
    }
}

impl<E: Endpoint> Drop for OwnedEndpoint<E> {
    fn drop(&mut self) {
        if self.endpoint.is_closed() {
            return;
        }
        let caller = thread::current().id();
        if caller != self.owner {
            warn!(
                "[OWNED] {} endpoint dropped on {:?} but owned by {:?}",
                self.endpoint.kind(),
                caller,
                self.owner
            );
            return;
        }
        if let Err(e) = self.endpoint.close() {
            warn!("[OWNED] failed to close {} endpoint: {}", self.endpoint.kind(), e);
        }
    }
}

impl<E: Endpoint> fmt::Debug for OwnedEndpoint<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedEndpoint")
            .field("kind", &self.endpoint.kind())
            .field("owner", &self.owner)
            .field("closed", &self.endpoint.is_closed())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use singlesock_core::inproc::{InprocContext, InprocSocket};

    type Owned = OwnedEndpoint<InprocSocket>;

    fn pair(ctx: &InprocContext, name: &str) -> (Owned, Owned) {
        let mut a = Owned::open(ctx, SocketType::Pair, EndpointOptions::default()).unwrap();
        let mut b = Owned::open(ctx, SocketType::Pair, EndpointOptions::default()).unwrap();
        a.bind(name).unwrap();
        b.connect(name).unwrap();
        (a, b)
    }

    #[test]
    fn test_empty_message_rejected() {
        let ctx = InprocContext::new();
        let (mut a, _b) = pair(&ctx, "inproc://owned-empty");
        assert!(matches!(a.send(Message::new()), Err(Error::EmptyMessage)));
    }

    #[test]
    fn test_send_rejected_without_peer() {
        let ctx = InprocContext::new();
        let options = EndpointOptions::default().with_send_timeout(Duration::from_millis(10));
        let mut push = Owned::open(&ctx, SocketType::Push, options).unwrap();
        push.connect("inproc://owned-nobody").unwrap();

        let err = push.send_text(&["lost"]).unwrap_err();
        assert!(matches!(err, Error::SendRejected));
        assert!(err.is_recoverable());
        assert!(!push.is_poisoned());
    }

    #[test]
    fn test_receive_timeout_returns_none() {
        let ctx = InprocContext::new();
        let (mut a, _b) = pair(&ctx, "inproc://owned-timeout");
        assert!(a.receive(Some(Duration::from_millis(10))).unwrap().is_none());
        assert!(!a.wait_readable(Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn test_receive_default_uses_options() {
        let ctx = InprocContext::new();
        let options = EndpointOptions::default().with_recv_timeout(Duration::from_millis(5));
        let mut pull = Owned::open(&ctx, SocketType::Pull, options).unwrap();
        pull.bind("inproc://owned-default").unwrap();
        assert!(pull.receive_default().unwrap().is_none());
    }

    #[test]
    fn test_close_twice_and_closed_errors() {
        let ctx = InprocContext::new();
        let (mut a, _b) = pair(&ctx, "inproc://owned-close");
        a.close().unwrap();
        a.close().unwrap();
        assert!(a.is_closed());
        assert!(matches!(a.send_text(&["x"]), Err(Error::Closed)));
        assert!(matches!(a.receive(None), Err(Error::Closed)));
    }

    #[test]
    fn test_moved_endpoint_is_rejected() {
        let ctx = InprocContext::new();
        let (a, _b) = pair(&ctx, "inproc://owned-moved");
        let owner = a.owner();

        let (a, err) = std::thread::spawn(move || {
            let mut a = a;
            let err = a.send_text(&["from elsewhere"]).unwrap_err();
            (a, err)
        })
        .join()
        .unwrap();

        match err {
            Error::OwnershipViolation {
                operation,
                owner: reported,
                caller,
            } => {
                assert_eq!(operation, "send");
                assert_eq!(reported, owner);
                assert_ne!(caller, owner);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(a.is_owner_thread());
    }
}
