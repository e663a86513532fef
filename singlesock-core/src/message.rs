//! Multipart messages and their frames.
//!
//! A [`Message`] is an ordered group of frames that travels as one unit. On the
//! wire each frame carries a `more` marker telling the receiver that further
//! frames belong to the same message; [`Message::parts`] exposes those markers.

use bytes::Bytes;

/// One chunk of a multipart message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload.
    pub data: Bytes,
    /// True when more frames of the same message follow.
    pub more: bool,
}

/// Builder and container for multipart messages.
///
/// # Examples
///
/// ```
/// use singlesock_core::message::Message;
///
/// // ROUTER envelope: [identity, empty, body]
/// let msg = Message::new()
///     .push_str("client-123")
///     .push_empty()
///     .push_str("Hello");
/// assert_eq!(msg.len(), 3);
///
/// let more: Vec<bool> = msg.parts().map(|frame| frame.more).collect();
/// assert_eq!(more, vec![true, true, false]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Bytes>,
}

impl Message {
    /// Create a new empty message.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Create a message with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
        }
    }

    /// Create a message from existing frames.
    #[must_use]
    pub const fn from_frames(frames: Vec<Bytes>) -> Self {
        Self { frames }
    }

    /// Build a text message, one frame per string.
    ///
    /// ```
    /// use singlesock_core::message::Message;
    ///
    /// let msg = Message::from_strs(&["Alice", "put", "12.34"]);
    /// assert_eq!(msg.to_strings_lossy(), vec!["Alice", "put", "12.34"]);
    /// ```
    pub fn from_strs<S: AsRef<str>>(parts: &[S]) -> Self {
        parts.iter().fold(Self::with_capacity(parts.len()), |msg, part| {
            msg.push_str(part.as_ref())
        })
    }

    /// Add a frame from any type that can be converted to `Bytes`.
    #[must_use]
    pub fn push(mut self, frame: impl Into<Bytes>) -> Self {
        self.frames.push(frame.into());
        self
    }

    /// Add a string frame.
    #[must_use]
    pub fn push_str(mut self, s: &str) -> Self {
        self.frames.push(Bytes::copy_from_slice(s.as_bytes()));
        self
    }

    /// Add an empty frame.
    ///
    /// Empty frames are used as delimiters in request/reply envelopes.
    #[must_use]
    pub fn push_empty(mut self) -> Self {
        self.frames.push(Bytes::new());
        self
    }

    /// Add a frame containing a big-endian u32.
    #[must_use]
    pub fn push_u32(mut self, value: u32) -> Self {
        self.frames.push(Bytes::copy_from_slice(&value.to_be_bytes()));
        self
    }

    /// Add a frame containing a big-endian u64.
    #[must_use]
    pub fn push_u64(mut self, value: u64) -> Self {
        self.frames.push(Bytes::copy_from_slice(&value.to_be_bytes()));
        self
    }

    /// Append a frame in place.
    pub fn push_frame(&mut self, frame: Bytes) {
        self.frames.push(frame);
    }

    /// Get the number of frames in the message.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the message has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Get a reference to the frames.
    #[must_use]
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// First frame, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Bytes> {
        self.frames.first()
    }

    /// Consume the message and return its frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames
    }

    /// Total payload size over all frames.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }

    /// Iterate over the frames with their `more` markers.
    pub fn parts(&self) -> impl Iterator<Item = Frame> + '_ {
        let last = self.frames.len().saturating_sub(1);
        self.frames.iter().enumerate().map(move |(i, data)| Frame {
            data: data.clone(),
            more: i < last,
        })
    }

    /// Decode every frame as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn to_strings_lossy(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }
}

impl From<Vec<Bytes>> for Message {
    fn from(frames: Vec<Bytes>) -> Self {
        Self::from_frames(frames)
    }
}

impl From<Message> for Vec<Bytes> {
    fn from(msg: Message) -> Self {
        msg.into_frames()
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::new().push_str(text)
    }
}

impl From<&[&str]> for Message {
    fn from(parts: &[&str]) -> Self {
        Self::from_strs(parts)
    }
}

impl<const N: usize> From<[&str; N]> for Message {
    fn from(parts: [&str; N]) -> Self {
        Self::from_strs(&parts)
    }
}

impl FromIterator<Bytes> for Message {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Message {
    type Item = Bytes;
    type IntoIter = std::vec::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}
