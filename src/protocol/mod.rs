//! Wire-level codecs, free of any I/O.
//!
//! Two device families, two codecs:
//!
//! - [`registers`]: fixed-point scaling between physical values and 16-bit
//!   register words for the register-mapped (Modbus) controller family.
//! - [`frame`]: the length-prefixed, checksum-trailed byte framing spoken
//!   by the deposition monitor family.

pub mod frame;
pub mod registers;
