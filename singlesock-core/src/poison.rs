//! RAII guard against half-written multipart messages.
//!
//! A multipart message is written one frame at a time. If a frame write fails
//! after earlier frames were accepted, the endpoint holds a partial message the
//! peer must never see completed by unrelated frames. The guard marks the
//! endpoint poisoned for the duration of the write and only clears the mark
//! when every frame went through:
//!
//! ```rust
//! use singlesock_core::poison::PoisonGuard;
//!
//! fn write_all(frames: &[&[u8]], poisoned: &mut bool) -> std::io::Result<()> {
//!     if *poisoned {
//!         return Err(std::io::Error::new(
//!             std::io::ErrorKind::BrokenPipe,
//!             "endpoint poisoned by an interrupted send",
//!         ));
//!     }
//!     let guard = PoisonGuard::new(poisoned);
//!     for _frame in frames {
//!         // write the frame; `?` here leaves the endpoint poisoned
//!     }
//!     guard.disarm();
//!     Ok(())
//! }
//!
//! let mut poisoned = false;
//! write_all(&[b"a", b"b"], &mut poisoned).unwrap();
//! assert!(!poisoned);
//! ```
//!
//! Once poisoned, an endpoint must be closed and reopened.

/// Marks a flag as poisoned until explicitly disarmed.
pub struct PoisonGuard<'a> {
    flag: &'a mut bool,
}

impl<'a> PoisonGuard<'a> {
    /// Arm the guard, immediately setting the flag.
    #[inline]
    pub fn new(flag: &'a mut bool) -> Self {
        *flag = true;
        Self { flag }
    }

    /// Clear the flag. Call only after the whole message was written.
    #[inline]
    pub fn disarm(self) {
        *self.flag = false;
    }
}
