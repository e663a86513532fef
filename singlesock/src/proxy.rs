//! Message proxy (broker) between two endpoints.
//!
//! A proxy connects a frontend and a backend endpoint and forwards every
//! message it receives on one to the other, unmodified. It blocks in the
//! [`Multiplexer`] until either side has data, so it never busy-polls.
//!
//! # Supported Patterns
//!
//! - **REQ-REP broker**: ROUTER frontend ←→ DEALER backend
//! - **PUSH-PULL forwarder**: PULL frontend ←→ PUSH backend
//! - **PAIR relay**: PAIR frontend ←→ PAIR backend
//!
//! # Message Flow
//!
//! ```text
//! Clients (REQ) → ROUTER (frontend) ⟷ DEALER (backend) → Workers (REP)
//!                          ↓
//!                 capture (optional copy of every message)
//! ```
//!
//! An optional control endpoint steers the proxy. Control messages are text
//! commands in the first frame:
//!
//! | command      | effect                                                    |
//! |--------------|-----------------------------------------------------------|
//! | `PAUSE`      | stop forwarding; messages stay queued in the endpoints    |
//! | `RESUME`     | forward again                                             |
//! | `TERMINATE`  | return from [`Proxy::run`]                                |
//! | `STATISTICS` | reply with the eight [`ProxyStats`] counters as u64 frames |
//!
//! The proxy runs until the shared context is terminated (or `TERMINATE`
//! arrives), then returns the counters.

use singlesock_core::message::Message;
use singlesock_core::socket_type::SocketType;
use singlesock_core::transport::Endpoint;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::owned::OwnedEndpoint;
use crate::poller::Multiplexer;

/// Traffic counters of a proxy, in the order `STATISTICS` reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    /// Messages received from the frontend
    pub frontend_messages_in: u64,
    /// Bytes received from the frontend
    pub frontend_bytes_in: u64,
    /// Messages sent to the frontend
    pub frontend_messages_out: u64,
    /// Bytes sent to the frontend
    pub frontend_bytes_out: u64,
    /// Messages received from the backend
    pub backend_messages_in: u64,
    /// Bytes received from the backend
    pub backend_bytes_in: u64,
    /// Messages sent to the backend
    pub backend_messages_out: u64,
    /// Bytes sent to the backend
    pub backend_bytes_out: u64,
}

impl ProxyStats {
    /// Counters as the eight-frame `STATISTICS` reply.
    pub fn to_message(&self) -> Message {
        Message::with_capacity(8)
            .push_u64(self.frontend_messages_in)
            .push_u64(self.frontend_bytes_in)
            .push_u64(self.frontend_messages_out)
            .push_u64(self.frontend_bytes_out)
            .push_u64(self.backend_messages_in)
            .push_u64(self.backend_bytes_in)
            .push_u64(self.backend_messages_out)
            .push_u64(self.backend_bytes_out)
    }

    /// Parse an eight-frame `STATISTICS` reply.
    pub fn from_message(message: &Message) -> Option<Self> {
        if message.len() != 8 {
            return None;
        }
        let mut values = [0u64; 8];
        for (value, frame) in values.iter_mut().zip(message.frames()) {
            *value = u64::from_be_bytes(frame.as_ref().try_into().ok()?);
        }
        Some(Self {
            frontend_messages_in: values[0],
            frontend_bytes_in: values[1],
            frontend_messages_out: values[2],
            frontend_bytes_out: values[3],
            backend_messages_in: values[4],
            backend_bytes_in: values[5],
            backend_messages_out: values[6],
            backend_bytes_out: values[7],
        })
    }
}

/// Commands understood on the control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyCommand {
    /// Stop forwarding
    Pause,
    /// Resume forwarding
    Resume,
    /// Return from the proxy loop
    Terminate,
    /// Report the traffic counters
    Statistics,
}

impl ProxyCommand {
    /// Wire form of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::Terminate => "TERMINATE",
            Self::Statistics => "STATISTICS",
        }
    }

    /// Parse a command frame.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        match frame {
            b"PAUSE" => Some(Self::Pause),
            b"RESUME" => Some(Self::Resume),
            b"TERMINATE" => Some(Self::Terminate),
            b"STATISTICS" => Some(Self::Statistics),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Frontend,
    Backend,
    Control,
}

/// Proxy builder: frontend and backend plus optional capture and control
/// endpoints, all owned by the calling thread.
pub struct Proxy<'a, E: Endpoint> {
    frontend: &'a mut OwnedEndpoint<E>,
    backend: &'a mut OwnedEndpoint<E>,
    capture: Option<&'a mut OwnedEndpoint<E>>,
    control: Option<&'a mut OwnedEndpoint<E>>,
    stats: ProxyStats,
    paused: bool,
}

impl<'a, E: Endpoint> Proxy<'a, E> {
    /// Proxy between `frontend` and `backend`.
    pub fn new(frontend: &'a mut OwnedEndpoint<E>, backend: &'a mut OwnedEndpoint<E>) -> Self {
        Self {
            frontend,
            backend,
            capture: None,
            control: None,
            stats: ProxyStats::default(),
            paused: false,
        }
    }

    /// Send a copy of every forwarded message to `capture`.
    pub fn with_capture(mut self, capture: &'a mut OwnedEndpoint<E>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Accept steering commands on `control`.
    pub fn with_control(mut self, control: &'a mut OwnedEndpoint<E>) -> Self {
        self.control = Some(control);
        self
    }

    /// Run the forwarding loop.
    ///
    /// Returns the counters once the context is terminated or a `TERMINATE`
    /// command arrives.
    ///
    /// # Errors
    ///
    /// Any error other than context termination, for example
    /// [`crate::Error::OwnershipViolation`] when called off the endpoints' owner thread.
    pub fn run(mut self) -> Result<ProxyStats> {
        debug!(
            "[PROXY] starting: {} ←→ {}{}",
            self.frontend.kind(),
            self.backend.kind(),
            if self.control.is_some() { " (steerable)" } else { "" }
        );
        let mut mux = Multiplexer::new();

        loop {
            match self.step(&mut mux) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) if err.is_context_terminated() => {
                    debug!("[PROXY] context terminated");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        info!("[PROXY] stopped: {:?}", self.stats);
        Ok(self.stats)
    }

    /// Handle one ready endpoint. `Ok(false)` ends the loop.
    fn step(&mut self, mux: &mut Multiplexer) -> Result<bool> {
        match self.wait(mux)? {
            Side::Frontend => {
                let Some(message) = self.frontend.receive(None)? else {
                    return Ok(true);
                };
                self.stats.frontend_messages_in += 1;
                self.stats.frontend_bytes_in += message.byte_len() as u64;
                trace!("[PROXY] {} → {}: {} frames", self.frontend.kind(), self.backend.kind(), message.len());
                self.capture(&message);

                let bytes = message.byte_len() as u64;
                if forward(self.backend, message)? {
                    self.stats.backend_messages_out += 1;
                    self.stats.backend_bytes_out += bytes;
                }
            }
            Side::Backend => {
                let Some(message) = self.backend.receive(None)? else {
                    return Ok(true);
                };
                self.stats.backend_messages_in += 1;
                self.stats.backend_bytes_in += message.byte_len() as u64;
                trace!("[PROXY] {} → {}: {} frames", self.backend.kind(), self.frontend.kind(), message.len());
                self.capture(&message);

                let bytes = message.byte_len() as u64;
                if forward(self.frontend, message)? {
                    self.stats.frontend_messages_out += 1;
                    self.stats.frontend_bytes_out += bytes;
                }
            }
            Side::Control => return self.handle_control(),
        }
        Ok(true)
    }

    fn wait(&mut self, mux: &mut Multiplexer) -> Result<Side> {
        let sides = [Side::Frontend, Side::Backend, Side::Control];
        match self.control.as_deref_mut() {
            Some(control) if self.paused => {
                // Only the control endpoint is watched while paused.
                control.wait_readable(None)?;
                Ok(Side::Control)
            }
            Some(control) => {
                let index = mux.wait_for_any(&mut [&mut *self.frontend, &mut *self.backend, control])?;
                Ok(sides[index])
            }
            None => {
                let index = mux.wait_for_any(&mut [&mut *self.frontend, &mut *self.backend])?;
                Ok(sides[index])
            }
        }
    }

    fn capture(&mut self, message: &Message) {
        if let Some(capture) = self.capture.as_deref_mut() {
            if let Err(e) = capture.send(message.clone()) {
                debug!("[PROXY] capture send failed: {}", e);
            }
        }
    }

    fn handle_control(&mut self) -> Result<bool> {
        let Some(control) = self.control.as_deref_mut() else {
            return Ok(true);
        };
        let Some(message) = control.receive(None)? else {
            return Ok(true);
        };
        let command = message.first().and_then(|frame| ProxyCommand::parse(frame));

        let reply = match command {
            Some(ProxyCommand::Pause) => {
                info!("[PROXY] paused");
                self.paused = true;
                None
            }
            Some(ProxyCommand::Resume) => {
                info!("[PROXY] resumed");
                self.paused = false;
                None
            }
            Some(ProxyCommand::Terminate) => {
                info!("[PROXY] terminate command received");
                acknowledge(control, ProxyCommand::Terminate);
                return Ok(false);
            }
            Some(ProxyCommand::Statistics) => Some(self.stats.to_message()),
            None => {
                warn!(
                    "[PROXY] unknown control command {:?}",
                    message.to_strings_lossy()
                );
                None
            }
        };

        match (reply, command) {
            (Some(stats), _) => {
                if let Err(e) = control.send(stats) {
                    warn!("[PROXY] could not report statistics: {}", e);
                }
            }
            (None, Some(command)) => acknowledge(control, command),
            (None, None) => {
                // A REP control endpoint must answer before it can read again.
                if control.kind() == SocketType::Rep {
                    if let Err(e) = control.send_text(&["UNKNOWN"]) {
                        warn!("[PROXY] could not reject control command: {}", e);
                    }
                }
            }
        }
        Ok(true)
    }
}

/// Forward a message. Returns whether it was sent; recoverable send failures
/// drop the message.
fn forward<E: Endpoint>(to: &mut OwnedEndpoint<E>, message: Message) -> Result<bool> {
    match to.send(message) {
        Ok(()) => Ok(true),
        Err(err) if err.is_recoverable() => {
            warn!("[PROXY] {} side not writable, dropping message: {}", to.kind(), err);
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// REP control endpoints must answer every request before the next one.
fn acknowledge<E: Endpoint>(control: &mut OwnedEndpoint<E>, command: ProxyCommand) {
    if control.kind() != SocketType::Rep {
        return;
    }
    if let Err(e) = control.send_text(&[command.as_str()]) {
        warn!("[PROXY] could not acknowledge {}: {}", command.as_str(), e);
    }
}

/// Run a proxy between `frontend` and `backend`, copying every message to
/// `capture` when given.
///
/// Returns the traffic counters when the context is terminated.
///
/// ```rust,no_run
/// use singlesock::{proxy, InprocContext, InprocEndpoint, SocketType};
/// use singlesock_core::options::EndpointOptions;
///
/// # fn main() -> singlesock::Result<()> {
/// let ctx = InprocContext::new();
/// let mut frontend = InprocEndpoint::open(&ctx, SocketType::Router, EndpointOptions::default())?;
/// frontend.bind("inproc://clients")?;
/// let mut backend = InprocEndpoint::open(&ctx, SocketType::Dealer, EndpointOptions::default())?;
/// backend.bind("inproc://workers")?;
///
/// let stats = proxy(&mut frontend, &mut backend, None)?;
/// println!("forwarded {} requests", stats.backend_messages_out);
/// # Ok(())
/// # }
/// ```
pub fn proxy<E: Endpoint>(
    frontend: &mut OwnedEndpoint<E>,
    backend: &mut OwnedEndpoint<E>,
    capture: Option<&mut OwnedEndpoint<E>>,
) -> Result<ProxyStats> {
    let proxy = Proxy::new(frontend, backend);
    match capture {
        Some(capture) => proxy.with_capture(capture).run(),
        None => proxy.run(),
    }
}
