//! Blocking byte-stream transports.
//!
//! A [`Transport`] is a pure byte pipe over one physical link: open, write,
//! drain, close. No framing and no retry logic lives here; both belong to
//! the drivers, which also decide how a quiet or garbled link is
//! classified. Every read is bounded by the transport's configured read
//! timeout, which is what bounds a whole polling tick.

mod mock;
#[cfg(feature = "instrument_serial")]
mod serial;

pub use mock::MockTransport;
#[cfg(feature = "instrument_serial")]
pub use serial::{Parity, SerialTransport};

use crate::error::Result;

/// Blocking byte pipe over a serial/Modbus link.
pub trait Transport: Send {
    /// Opens the physical link. Fails with [`crate::DaqError::Connection`];
    /// callers treat that as fatal before the first tick.
    fn open(&mut self) -> Result<()>;

    /// Writes all bytes to the link.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Drains whatever is currently buffered into `buf`, waiting at most
    /// the configured read timeout for the first byte. Returns the number
    /// of bytes appended; `0` means the link stayed quiet.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize>;

    /// Closes the link. Safe to call when already closed.
    fn close(&mut self) -> Result<()>;
}
