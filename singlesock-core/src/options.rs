//! Endpoint configuration options
//!
//! This module provides the options an endpoint is opened with, in the spirit of
//! libzmq's socket options (zmq_setsockopt/zmq_getsockopt).

use bytes::Bytes;
use std::io;
use std::time::Duration;

/// Endpoint configuration options.
///
/// # Examples
///
/// ```
/// use singlesock_core::options::EndpointOptions;
/// use std::time::Duration;
///
/// let opts = EndpointOptions::default()
///     .with_recv_timeout(Duration::from_millis(500))
///     .with_send_timeout(Duration::from_secs(5));
/// assert_eq!(opts.recv_timeout, Some(Duration::from_millis(500)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EndpointOptions {
    /// Writability wait before a send (ZMQ_SNDTIMEO)
    ///
    /// - `None`: Block until the endpoint is writable (default)
    /// - `Some(Duration::ZERO)`: Reject immediately when not writable
    /// - `Some(duration)`: Wait up to duration, then reject
    pub send_timeout: Option<Duration>,

    /// Default receive timeout (ZMQ_RCVTIMEO)
    ///
    /// Used by receives that do not pass an explicit timeout.
    /// - `None`: Block indefinitely (default)
    /// - `Some(duration)`: Wait up to duration, then report "no message"
    pub recv_timeout: Option<Duration>,

    /// Socket identity / routing ID (ZMQ_ROUTING_ID / ZMQ_IDENTITY)
    ///
    /// Identity seen by ROUTER peers. If None, a 5-byte id starting with a
    /// null byte is generated.
    pub routing_id: Option<Bytes>,

    /// Subscription filters installed when a SUB endpoint is opened
    /// (ZMQ_SUBSCRIBE). An empty filter matches every message.
    pub subscriptions: Vec<Bytes>,
}

impl EndpointOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the writability wait used by sends.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the default receive timeout.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Set the routing id presented to ROUTER peers.
    pub fn with_routing_id(mut self, id: impl Into<Bytes>) -> Self {
        self.routing_id = Some(id.into());
        self
    }

    /// Add a subscription filter applied at open time.
    pub fn with_subscription(mut self, filter: impl Into<Bytes>) -> Self {
        self.subscriptions.push(filter.into());
        self
    }

    /// Check if sends should reject immediately when not writable.
    pub fn is_send_nonblocking(&self) -> bool {
        matches!(self.send_timeout, Some(d) if d.is_zero())
    }

    /// Validate a routing ID.
    ///
    /// Routing ids must be 1-255 bytes long and must not start with a null
    /// byte, which is reserved for generated ids.
    pub fn validate_routing_id(id: &[u8]) -> io::Result<()> {
        if id.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "routing ID cannot be empty",
            ));
        }

        if id.len() > 255 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("routing ID cannot exceed 255 bytes (got {})", id.len()),
            ));
        }

        if id[0] == 0x00 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "routing ID cannot start with null byte (reserved for auto-generated IDs)",
            ));
        }

        Ok(())
    }
}

/// Convert a millisecond timeout in the libzmq convention into a `Duration`.
///
/// Negative values mean "block indefinitely" and map to `None`.
///
/// ```
/// use singlesock_core::options::timeout_from_millis;
/// use std::time::Duration;
///
/// assert_eq!(timeout_from_millis(-1), None);
/// assert_eq!(timeout_from_millis(200), Some(Duration::from_millis(200)));
/// ```
pub fn timeout_from_millis(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().map(Duration::from_millis)
}

/// Convert an optional timeout back into libzmq milliseconds (`-1` = infinite).
pub fn timeout_to_millis(timeout: Option<Duration>) -> i64 {
    match timeout {
        None => -1,
        Some(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_block() {
        let opts = EndpointOptions::default();
        assert_eq!(opts.send_timeout, None);
        assert_eq!(opts.recv_timeout, None);
        assert!(opts.routing_id.is_none());
        assert!(opts.subscriptions.is_empty());
        assert!(!opts.is_send_nonblocking());
    }

    #[test]
    fn test_builder() {
        let opts = EndpointOptions::new()
            .with_send_timeout(Duration::ZERO)
            .with_routing_id(&b"teller"[..])
            .with_subscription(&b"mainChannel"[..]);
        assert!(opts.is_send_nonblocking());
        assert_eq!(opts.routing_id, Some(Bytes::from_static(b"teller")));
        assert_eq!(opts.subscriptions.len(), 1);
    }

    #[test]
    fn test_routing_id_validation() {
        assert!(EndpointOptions::validate_routing_id(b"worker-1").is_ok());
        assert!(EndpointOptions::validate_routing_id(b"").is_err());
        assert!(EndpointOptions::validate_routing_id(&[0, 1, 2]).is_err());
        assert!(EndpointOptions::validate_routing_id(&[b'a'; 256]).is_err());
    }

    #[test]
    fn test_millis_conversion() {
        assert_eq!(timeout_from_millis(-1), None);
        assert_eq!(timeout_from_millis(0), Some(Duration::ZERO));
        assert_eq!(timeout_to_millis(None), -1);
        assert_eq!(timeout_to_millis(Some(Duration::from_millis(500))), 500);
    }
}
