//! In-process transport for messaging between threads of the same process.
//!
//! Sockets created from the same [`InprocContext`] rendezvous through `inproc://`
//! names. Messages travel whole over `flume` channels: frames are buffered until
//! the frame without the `more` marker, then the complete message is handed to
//! the peer, so a receiver never sees part of a message.
//!
//! # Features
//!
//! - **Zero-copy**: frames are `Bytes`, shared between sender and receiver
//! - **Connect before bind**: connects to a name nobody bound yet complete when
//!   the bind happens
//! - **Patterns**: PAIR, REQ/REP, DEALER/ROUTER, PUB/SUB and PUSH/PULL routing
//! - **Termination**: [`InprocContext::terminate`] wakes every blocked call
//!
//! # Usage
//!
//! ```rust
//! use singlesock_core::inproc::{InprocContext, InprocSocket};
//! use singlesock_core::options::EndpointOptions;
//! use singlesock_core::socket_type::SocketType;
//! use singlesock_core::transport::Endpoint;
//! use bytes::Bytes;
//!
//! # fn example() -> std::io::Result<()> {
//! let ctx = InprocContext::new();
//! let opts = EndpointOptions::default();
//!
//! let mut server = InprocSocket::open(&ctx, SocketType::Pair, &opts)?;
//! server.bind("inproc://my-endpoint")?;
//!
//! let mut client = InprocSocket::open(&ctx, SocketType::Pair, &opts)?;
//! client.connect("inproc://my-endpoint")?;
//!
//! client.send_frame(Bytes::from("Hello"), false)?;
//! assert_eq!(server.receive_frame()?, Bytes::from("Hello"));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use bytes::Bytes;
use dashmap::DashMap;
use flume::{Receiver, RecvTimeoutError, Selector, Sender};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::address::Address;
use crate::error::{self, SocketStateError};
use crate::options::EndpointOptions;
use crate::socket_type::SocketType;
use crate::transport::Endpoint;

/// Identifier of a socket inside its context.
pub type SocketId = u64;

/// Frames of one message; most messages have 1-4 frames.
type Frames = SmallVec<[Bytes; 4]>;

#[derive(Debug, Clone)]
struct Origin {
    id: SocketId,
    routing_id: Bytes,
}

enum Delivery {
    Message { origin: Origin, frames: Frames },
    Terminate,
}

/// Everything a peer needs to reach a socket.
#[derive(Clone)]
struct PeerHandle {
    id: SocketId,
    kind: SocketType,
    routing_id: Bytes,
    inbox: Sender<Delivery>,
    links: Arc<LinkTable>,
    subscriptions: Arc<RwLock<Vec<Bytes>>>,
}

impl PeerHandle {
    fn origin(&self) -> Origin {
        Origin {
            id: self.id,
            routing_id: self.routing_id.clone(),
        }
    }

    fn deliver(&self, origin: Origin, frames: Frames) {
        if self.inbox.send(Delivery::Message { origin, frames }).is_err() {
            trace!("[INPROC] socket {} is gone, dropping message", self.id);
        }
    }

    fn wants(&self, topic: &[u8]) -> bool {
        self.subscriptions
            .read()
            .iter()
            .any(|filter| topic.starts_with(filter.as_ref()))
    }
}

struct Link {
    address: String,
    peer: PeerHandle,
}

/// Peers a socket is linked to. The condvar fires whenever a peer is added or
/// the context terminates.
#[derive(Default)]
struct LinkTable {
    links: Mutex<Vec<Link>>,
    changed: Condvar,
}

impl LinkTable {
    fn add(&self, address: &str, peer: PeerHandle) {
        self.links.lock().push(Link {
            address: address.to_string(),
            peer,
        });
        self.changed.notify_all();
    }

    /// Add `peer` only if the table is empty.
    fn add_exclusive(&self, address: &str, peer: PeerHandle) -> bool {
        let mut links = self.links.lock();
        if !links.is_empty() {
            return false;
        }
        links.push(Link {
            address: address.to_string(),
            peer,
        });
        drop(links);
        self.changed.notify_all();
        true
    }

    fn remove_peer(&self, id: SocketId) {
        self.links.lock().retain(|link| link.peer.id != id);
    }

    fn take_address(&self, address: &str) -> Vec<PeerHandle> {
        let mut links = self.links.lock();
        let mut removed = Vec::new();
        links.retain(|link| {
            if link.address == address {
                removed.push(link.peer.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    fn take_all(&self) -> Vec<PeerHandle> {
        self.links.lock().drain(..).map(|link| link.peer).collect()
    }

    fn peers(&self) -> SmallVec<[PeerHandle; 4]> {
        self.links.lock().iter().map(|link| link.peer.clone()).collect()
    }

    fn find(&self, predicate: impl Fn(&PeerHandle) -> bool) -> Option<PeerHandle> {
        self.links
            .lock()
            .iter()
            .find(|link| predicate(&link.peer))
            .map(|link| link.peer.clone())
    }

    fn len(&self) -> usize {
        self.links.lock().len()
    }

    fn wake(&self) {
        let _links = self.links.lock();
        self.changed.notify_all();
    }
}

#[derive(Default)]
struct Registry {
    bound: HashMap<String, PeerHandle>,
    pending: HashMap<String, Vec<PeerHandle>>,
}

struct ContextInner {
    registry: Mutex<Registry>,
    sockets: DashMap<SocketId, PeerHandle>,
    next_id: AtomicU64,
    terminated: AtomicBool,
}

/// Shared rendezvous point for in-process sockets.
///
/// Cloning is cheap and every clone refers to the same context; this is the
/// one transport object that may be used from any number of threads.
#[derive(Clone)]
pub struct InprocContext {
    inner: Arc<ContextInner>,
}

impl InprocContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                registry: Mutex::new(Registry::default()),
                sockets: DashMap::new(),
                next_id: AtomicU64::new(1),
                terminated: AtomicBool::new(false),
            }),
        }
    }

    /// Terminate the context.
    ///
    /// Every blocked receive, readiness wait and writability wait on a socket
    /// of this context returns an error for which
    /// [`is_context_terminated`](crate::error::is_context_terminated) holds, as
    /// does every later operation. Sockets must still be closed by their owners.
    /// Calling this twice is a no-op.
    pub fn terminate(&self) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut registry = self.inner.registry.lock();
            registry.bound.clear();
            registry.pending.clear();
        }

        let live: Vec<PeerHandle> = self
            .inner
            .sockets
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        debug!("[INPROC] terminating context, waking {} sockets", live.len());

        for peer in live {
            let _ = peer.inbox.send(Delivery::Terminate);
            peer.links.wake();
        }
    }

    /// Whether [`InprocContext::terminate`] was called.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Currently bound addresses, as `inproc://name`.
    pub fn bound_addresses(&self) -> Vec<String> {
        self.inner
            .registry
            .lock()
            .bound
            .keys()
            .map(|name| format!("inproc://{}", name))
            .collect()
    }

    /// Number of sockets opened in this context and not yet closed.
    pub fn live_sockets(&self) -> usize {
        self.inner.sockets.len()
    }

    fn ensure_live(&self) -> io::Result<()> {
        if self.is_terminated() {
            Err(error::terminated())
        } else {
            Ok(())
        }
    }
}

impl Default for InprocContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InprocContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InprocContext")
            .field("live_sockets", &self.live_sockets())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Socket of the in-process transport.
pub struct InprocSocket {
    context: InprocContext,
    handle: PeerHandle,
    inbox: Receiver<Delivery>,
    bound: Vec<String>,
    connected: Vec<String>,
    /// Remaining frames of the message being read
    current: VecDeque<Bytes>,
    /// Next message, pulled in by a readiness check
    queued: Option<VecDeque<Bytes>>,
    /// Frames written so far of the message being sent
    outgoing: Frames,
    next_peer: usize,
    /// REQ: peer the outstanding request went to
    awaiting_reply: Option<SocketId>,
    /// REP: requester and envelope of the request being served
    reply_to: Option<(SocketId, Frames)>,
    closed: bool,
}

impl InprocSocket {
    /// Identifier of this socket inside its context.
    pub fn id(&self) -> SocketId {
        self.handle.id
    }

    /// Routing id presented to ROUTER peers.
    pub fn routing_id(&self) -> &Bytes {
        &self.handle.routing_id
    }

    /// Context this socket belongs to.
    pub fn context(&self) -> &InprocContext {
        &self.context
    }

    /// Number of peers currently linked to this socket.
    pub fn peer_count(&self) -> usize {
        self.handle.links.len()
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            Err(error::socket_closed())
        } else {
            Ok(())
        }
    }

    fn ensure_usable(&self) -> io::Result<()> {
        self.ensure_open()?;
        self.context.ensure_live()
    }

    fn has_pending(&self) -> bool {
        !self.current.is_empty() || self.queued.is_some()
    }

    fn accepts_input(&self) -> bool {
        self.handle.kind.can_recv() && self.check_recv_state().is_ok()
    }

    fn check_send_state(&self) -> io::Result<()> {
        match self.handle.kind {
            SocketType::Req if self.awaiting_reply.is_some() => {
                Err(SocketStateError::ReqAwaitingReply.into())
            }
            SocketType::Rep if self.reply_to.is_none() => Err(SocketStateError::RepNoRequest.into()),
            _ => Ok(()),
        }
    }

    fn check_recv_state(&self) -> io::Result<()> {
        match self.handle.kind {
            SocketType::Req if self.awaiting_reply.is_none() => {
                Err(SocketStateError::ReqNoRequest.into())
            }
            SocketType::Rep if self.reply_to.is_some() => {
                Err(SocketStateError::RepAwaitingReply.into())
            }
            _ => Ok(()),
        }
    }

    fn next_peer(&mut self) -> Option<PeerHandle> {
        let peers = self.handle.links.peers();
        if peers.is_empty() {
            return None;
        }
        let peer = peers[self.next_peer % peers.len()].clone();
        self.next_peer = self.next_peer.wrapping_add(1);
        Some(peer)
    }

    fn dispatch(&mut self, frames: Frames) -> io::Result<()> {
        let origin = self.handle.origin();

        match self.handle.kind {
            SocketType::Pub => {
                let topic = frames.first().cloned().unwrap_or_default();
                let mut delivered = 0usize;
                for peer in self.handle.links.peers() {
                    if peer.wants(&topic) {
                        peer.deliver(origin.clone(), frames.clone());
                        delivered += 1;
                    }
                }
                trace!(
                    "[INPROC] PUB {} delivered to {} subscribers",
                    self.handle.id,
                    delivered
                );
            }
            SocketType::Router => {
                let mut frames = frames.into_iter();
                let target = frames.next().unwrap_or_default();
                let body: Frames = frames.collect();
                if body.is_empty() {
                    trace!("[INPROC] ROUTER {} dropping message without body", self.handle.id);
                    return Ok(());
                }
                match self.handle.links.find(|peer| peer.routing_id == target) {
                    Some(peer) => peer.deliver(origin, body),
                    None => trace!(
                        "[INPROC] ROUTER {} dropping message for unknown peer {:?}",
                        self.handle.id,
                        target
                    ),
                }
            }
            SocketType::Rep => {
                let (requester, mut envelope) = self
                    .reply_to
                    .take()
                    .ok_or(SocketStateError::RepNoRequest)?;
                envelope.extend(frames);
                match self.handle.links.find(|peer| peer.id == requester) {
                    Some(peer) => peer.deliver(origin, envelope),
                    None => trace!(
                        "[INPROC] REP {} requester {} went away, dropping reply",
                        self.handle.id,
                        requester
                    ),
                }
            }
            SocketType::Req => {
                let peer = self.next_peer().ok_or_else(no_peer)?;
                let mut request = Frames::with_capacity(frames.len() + 1);
                request.push(Bytes::new());
                request.extend(frames);
                self.awaiting_reply = Some(peer.id);
                peer.deliver(origin, request);
            }
            SocketType::Pair | SocketType::Push | SocketType::Dealer => {
                let peer = self.next_peer().ok_or_else(no_peer)?;
                peer.deliver(origin, frames);
            }
            SocketType::Sub | SocketType::Pull => {
                return Err(unsupported(self.handle.kind, "send"));
            }
        }

        Ok(())
    }

    /// Apply the socket pattern to an incoming message. `None` means the
    /// message is dropped.
    fn accept(&mut self, origin: Origin, mut frames: Frames) -> Option<VecDeque<Bytes>> {
        let message: VecDeque<Bytes> = match self.handle.kind {
            SocketType::Router => {
                let mut message = VecDeque::with_capacity(frames.len() + 1);
                message.push_back(origin.routing_id);
                message.extend(frames);
                message
            }
            SocketType::Rep => {
                let Some(delimiter) = frames.iter().position(|frame| frame.is_empty()) else {
                    trace!("[INPROC] REP {} dropping request without envelope", self.handle.id);
                    return None;
                };
                let body: VecDeque<Bytes> = frames.drain(delimiter + 1..).collect();
                if body.is_empty() {
                    return None;
                }
                self.reply_to = Some((origin.id, frames));
                body
            }
            SocketType::Req => {
                if self.awaiting_reply != Some(origin.id) {
                    trace!(
                        "[INPROC] REQ {} dropping unexpected message from {}",
                        self.handle.id,
                        origin.id
                    );
                    return None;
                }
                if !frames.first().is_some_and(|frame| frame.is_empty()) {
                    trace!("[INPROC] REQ {} dropping reply without delimiter", self.handle.id);
                    return None;
                }
                self.awaiting_reply = None;
                frames.into_iter().skip(1).collect()
            }
            _ => frames.into_iter().collect(),
        };

        if message.is_empty() {
            None
        } else {
            Some(message)
        }
    }

    fn absorb(&mut self, delivery: Delivery) -> io::Result<Option<VecDeque<Bytes>>> {
        match delivery {
            Delivery::Terminate => Err(error::terminated()),
            Delivery::Message { origin, frames } => Ok(self.accept(origin, frames)),
        }
    }

    /// Wait for the next accepted message. `Ok(None)` means the timeout elapsed.
    fn fetch(&mut self, timeout: Option<Duration>) -> io::Result<Option<VecDeque<Bytes>>> {
        let deadline = deadline_after(timeout);
        loop {
            self.context.ensure_live()?;
            let delivery = match deadline {
                None => self.inbox.recv().map_err(|_| error::socket_closed())?,
                Some(deadline) => match self.inbox.recv_deadline(deadline) {
                    Ok(delivery) => delivery,
                    Err(RecvTimeoutError::Timeout) => return Ok(None),
                    Err(RecvTimeoutError::Disconnected) => return Err(error::socket_closed()),
                },
            };
            if let Some(message) = self.absorb(delivery)? {
                return Ok(Some(message));
            }
        }
    }

    fn wait_for_peer(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let deadline = deadline_after(timeout);
        let table = &self.handle.links;
        let mut links = table.links.lock();
        loop {
            if !links.is_empty() {
                return Ok(true);
            }
            if self.context.is_terminated() {
                return Err(error::terminated());
            }
            match deadline {
                None => table.changed.wait(&mut links),
                Some(deadline) => {
                    if table.changed.wait_until(&mut links, deadline).timed_out() {
                        return Ok(!links.is_empty());
                    }
                }
            }
        }
    }
}

impl Endpoint for InprocSocket {
    type Context = InprocContext;

    fn open(
        context: &InprocContext,
        kind: SocketType,
        options: &EndpointOptions,
    ) -> io::Result<Self> {
        context.ensure_live()?;

        let id = context.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let routing_id = match &options.routing_id {
            Some(routing_id) => {
                EndpointOptions::validate_routing_id(routing_id)?;
                routing_id.clone()
            }
            None => generated_routing_id(id),
        };

        let (inbox_tx, inbox) = flume::unbounded();
        let handle = PeerHandle {
            id,
            kind,
            routing_id,
            inbox: inbox_tx,
            links: Arc::default(),
            subscriptions: Arc::default(),
        };

        // Register before the final liveness check so terminate() either sees
        // this socket or we see the flag.
        context.inner.sockets.insert(id, handle.clone());
        if context.is_terminated() {
            context.inner.sockets.remove(&id);
            return Err(error::terminated());
        }

        let mut socket = Self {
            context: context.clone(),
            handle,
            inbox,
            bound: Vec::new(),
            connected: Vec::new(),
            current: VecDeque::new(),
            queued: None,
            outgoing: Frames::new(),
            next_peer: 0,
            awaiting_reply: None,
            reply_to: None,
            closed: false,
        };

        for filter in &options.subscriptions {
            socket.set_subscription_filter(filter)?;
        }

        debug!("[INPROC] opened {} socket {}", kind, id);
        Ok(socket)
    }

    fn kind(&self) -> SocketType {
        self.handle.kind
    }

    fn bind(&mut self, address: &str) -> io::Result<()> {
        self.ensure_usable()?;
        let name = inproc_name(address)?;

        let pending = {
            let mut registry = self.context.inner.registry.lock();
            if registry.bound.contains_key(&name) {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("inproc endpoint '{}' is already bound", name),
                ));
            }
            registry.bound.insert(name.clone(), self.handle.clone());
            registry.pending.remove(&name).unwrap_or_default()
        };

        for connector in pending {
            if !self.handle.kind.is_compatible(connector.kind) {
                warn!(
                    "[INPROC] {} socket {} cannot talk to {} socket {} on {}, ignoring its connect",
                    self.handle.kind, self.handle.id, connector.kind, connector.id, address
                );
            } else if !link(&self.handle, &connector, address) {
                warn!(
                    "[INPROC] PAIR socket {} already has a peer, ignoring socket {} on {}",
                    self.handle.id, connector.id, address
                );
            }
        }

        self.bound.push(address.to_string());
        debug!("[INPROC] socket {} bound to {}", self.handle.id, address);
        Ok(())
    }

    fn connect(&mut self, address: &str) -> io::Result<()> {
        self.ensure_usable()?;
        let name = inproc_name(address)?;

        let binder = {
            let mut registry = self.context.inner.registry.lock();
            match registry.bound.get(&name) {
                Some(binder) => Some(binder.clone()),
                None => {
                    registry
                        .pending
                        .entry(name)
                        .or_default()
                        .push(self.handle.clone());
                    None
                }
            }
        };

        match binder {
            Some(binder) => {
                if !self.handle.kind.is_compatible(binder.kind) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!(
                            "{} socket cannot connect to {} socket at {}",
                            self.handle.kind, binder.kind, address
                        ),
                    ));
                }
                if !link(&self.handle, &binder, address) {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("PAIR endpoint {} already has a peer", address),
                    ));
                }
                debug!("[INPROC] socket {} connected to {}", self.handle.id, address);
            }
            None => debug!(
                "[INPROC] socket {} waiting for {} to be bound",
                self.handle.id, address
            ),
        }

        self.connected.push(address.to_string());
        Ok(())
    }

    fn disconnect(&mut self, address: &str) -> io::Result<()> {
        self.ensure_open()?;
        let Some(position) = self.connected.iter().position(|a| a == address) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not connected to {}", address),
            ));
        };
        self.connected.remove(position);

        if let Ok(name) = inproc_name(address) {
            let mut registry = self.context.inner.registry.lock();
            if let Some(waiting) = registry.pending.get_mut(&name) {
                waiting.retain(|peer| peer.id != self.handle.id);
            }
        }

        for peer in self.handle.links.take_address(address) {
            peer.links.remove_peer(self.handle.id);
        }
        debug!("[INPROC] socket {} disconnected from {}", self.handle.id, address);
        Ok(())
    }

    fn set_subscription_filter(&mut self, filter: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        if self.handle.kind != SocketType::Sub {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} sockets do not take subscription filters", self.handle.kind),
            ));
        }
        let mut subscriptions = self.handle.subscriptions.write();
        if !subscriptions.iter().any(|existing| existing.as_ref() == filter) {
            subscriptions.push(Bytes::copy_from_slice(filter));
        }
        Ok(())
    }

    fn send_frame(&mut self, data: Bytes, more: bool) -> io::Result<()> {
        self.ensure_usable()?;
        if !self.handle.kind.can_send() {
            return Err(unsupported(self.handle.kind, "send"));
        }
        if self.outgoing.is_empty() {
            self.check_send_state()?;
        }

        self.outgoing.push(data);
        if more {
            return Ok(());
        }

        let frames = std::mem::take(&mut self.outgoing);
        self.dispatch(frames)
    }

    fn receive_frame(&mut self) -> io::Result<Bytes> {
        self.ensure_usable()?;
        if !self.handle.kind.can_recv() {
            return Err(unsupported(self.handle.kind, "receive"));
        }

        if self.current.is_empty() {
            self.current = match self.queued.take() {
                Some(message) => message,
                None => {
                    self.check_recv_state()?;
                    self.fetch(None)?.ok_or_else(error::socket_closed)?
                }
            };
        }

        self.current.pop_front().ok_or_else(error::socket_closed)
    }

    fn has_more_frames(&mut self) -> io::Result<bool> {
        Ok(!self.current.is_empty())
    }

    fn poll_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        self.ensure_usable()?;
        if self.has_pending() {
            return Ok(true);
        }
        if !self.handle.kind.can_recv() {
            return Err(unsupported(self.handle.kind, "receive"));
        }
        if let Err(err) = self.check_recv_state() {
            // Nothing can become readable until the owner sends, so a bounded
            // wait just runs out its timeout.
            return match deadline_after(timeout) {
                Some(deadline) => {
                    sleep_until(deadline);
                    Ok(false)
                }
                None if timeout.is_some() => Ok(false),
                None => Err(err),
            };
        }

        match self.fetch(timeout)? {
            Some(message) => {
                self.queued = Some(message);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn poll_writable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        self.ensure_usable()?;
        match self.handle.kind {
            SocketType::Pub | SocketType::Router => Ok(true),
            SocketType::Sub | SocketType::Pull => Ok(false),
            SocketType::Rep => Ok(self.reply_to.is_some()),
            SocketType::Req if self.awaiting_reply.is_some() => Ok(false),
            SocketType::Req | SocketType::Pair | SocketType::Push | SocketType::Dealer => {
                self.wait_for_peer(timeout)
            }
        }
    }

    fn poll_any(set: &mut [&mut Self], timeout: Option<Duration>) -> io::Result<Option<usize>> {
        let deadline = deadline_after(timeout);

        loop {
            for (index, socket) in set.iter().enumerate() {
                socket.ensure_usable()?;
                if socket.has_pending() {
                    return Ok(Some(index));
                }
            }

            let candidates: SmallVec<[usize; 4]> = set
                .iter()
                .enumerate()
                .filter(|(_, socket)| socket.accepts_input())
                .map(|(index, _)| index)
                .collect();

            if candidates.is_empty() {
                if timeout.is_none() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "no socket in the wait set can receive",
                    ));
                }
                if let Some(deadline) = deadline {
                    sleep_until(deadline);
                }
                return Ok(None);
            }

            // Sweep in set order first so lower indices win when several are ready.
            for &index in &candidates {
                let socket = &mut *set[index];
                while let Ok(delivery) = socket.inbox.try_recv() {
                    if let Some(message) = socket.absorb(delivery)? {
                        socket.queued = Some(message);
                        return Ok(Some(index));
                    }
                }
            }

            let selected = {
                let mut selector = Selector::new();
                for &index in &candidates {
                    selector = selector.recv(&set[index].inbox, move |result| (index, result));
                }
                match deadline {
                    None => Some(selector.wait()),
                    Some(deadline) => selector.wait_deadline(deadline).ok(),
                }
            };

            let Some((index, result)) = selected else {
                return Ok(None);
            };
            let delivery = result.map_err(|_| error::socket_closed())?;
            let socket = &mut *set[index];
            if let Some(message) = socket.absorb(delivery)? {
                socket.queued = Some(message);
                return Ok(Some(index));
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let id = self.handle.id;

        {
            let mut registry = self.context.inner.registry.lock();
            for address in self.bound.drain(..) {
                if let Ok(name) = inproc_name(&address) {
                    if registry.bound.get(&name).is_some_and(|binder| binder.id == id) {
                        registry.bound.remove(&name);
                    }
                }
            }
            for waiting in registry.pending.values_mut() {
                waiting.retain(|peer| peer.id != id);
            }
            registry.pending.retain(|_, waiting| !waiting.is_empty());
        }

        for peer in self.handle.links.take_all() {
            peer.links.remove_peer(id);
        }
        self.context.inner.sockets.remove(&id);

        self.connected.clear();
        self.current.clear();
        self.queued = None;
        self.outgoing.clear();
        self.awaiting_reply = None;
        self.reply_to = None;

        debug!("[INPROC] closed {} socket {}", self.handle.kind, id);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for InprocSocket {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for InprocSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InprocSocket")
            .field("id", &self.handle.id)
            .field("kind", &self.handle.kind)
            .field("bound", &self.bound)
            .field("connected", &self.connected)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Link two sockets both ways. A PAIR socket takes a single peer; a second
/// link to either side is refused and `false` returned.
fn link(a: &PeerHandle, b: &PeerHandle, address: &str) -> bool {
    if a.kind != SocketType::Pair {
        a.links.add(address, b.clone());
        b.links.add(address, a.clone());
        return true;
    }
    if !a.links.add_exclusive(address, b.clone()) {
        return false;
    }
    if !b.links.add_exclusive(address, a.clone()) {
        a.links.remove_peer(b.id);
        return false;
    }
    true
}

/// 5-byte id: a null byte followed by the big-endian socket id.
fn generated_routing_id(id: SocketId) -> Bytes {
    let mut routing_id = Vec::with_capacity(5);
    routing_id.push(0u8);
    routing_id.extend_from_slice(&(id as u32).to_be_bytes());
    Bytes::from(routing_id)
}

fn inproc_name(address: &str) -> io::Result<String> {
    match Address::parse(address) {
        Ok(Address::Inproc(name)) => Ok(name),
        Ok(other) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("the in-process transport cannot reach {}", other),
        )),
        Err(err) => Err(io::Error::new(io::ErrorKind::InvalidInput, err)),
    }
}

fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|timeout| Instant::now().checked_add(timeout))
}

fn sleep_until(deadline: Instant) {
    thread::sleep(deadline.saturating_duration_since(Instant::now()));
}

fn no_peer() -> io::Error {
    io::Error::new(io::ErrorKind::WouldBlock, "no connected peer")
}

fn unsupported(kind: SocketType, operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} sockets cannot {}", kind, operation),
    )
}
