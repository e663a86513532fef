//! Socket type enumeration.
//!
//! The socket type decides how a transport routes outgoing messages and how it
//! rewrites incoming ones (envelopes, routing ids, subscriptions).

use std::fmt;

/// Messaging pattern of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// Exactly one PAIR peer; messages pass both ways unchanged
    Pair,
    /// Sends to every SUB whose filter is a prefix of the first frame; never receives
    Pub,
    /// Receives what matches its subscription filters; never sends
    Sub,
    /// Alternates send and receive; requests go round-robin behind an empty delimiter
    Req,
    /// Alternates receive and reply; the reply returns along the request's envelope
    Rep,
    /// Round-robin sends, fair-queued receives, no envelope handling
    Dealer,
    /// Prefixes each incoming message with the sender's routing id and routes
    /// outgoing messages by their first frame
    Router,
    /// Fair-queued receive from PUSH peers; never sends
    Pull,
    /// Round-robin send to PULL peers; never receives
    Push,
}

impl SocketType {
    /// Upper-case name, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Dealer => "DEALER",
            Self::Router => "ROUTER",
            Self::Pull => "PULL",
            Self::Push => "PUSH",
        }
    }

    /// Socket types this one may be linked to.
    pub fn peer_types(&self) -> &'static [SocketType] {
        match self {
            Self::Pair => &[Self::Pair],
            Self::Pub => &[Self::Sub],
            Self::Sub => &[Self::Pub],
            Self::Req => &[Self::Rep, Self::Router],
            Self::Rep => &[Self::Req, Self::Dealer],
            Self::Dealer => &[Self::Rep, Self::Router, Self::Dealer],
            Self::Router => &[Self::Req, Self::Dealer, Self::Router],
            Self::Pull => &[Self::Push],
            Self::Push => &[Self::Pull],
        }
    }

    /// Whether a socket of this type may be linked to a `peer` socket.
    pub fn is_compatible(&self, peer: SocketType) -> bool {
        self.peer_types().contains(&peer)
    }

    /// False for SUB and PULL.
    pub fn can_send(&self) -> bool {
        !matches!(self, Self::Sub | Self::Pull)
    }

    /// False for PUB and PUSH.
    pub fn can_recv(&self) -> bool {
        !matches!(self, Self::Pub | Self::Push)
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
