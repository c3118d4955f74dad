//! Framing codec for the Inficon SQC310 deposition monitor.
//!
//! ## Wire format
//!
//! ```text
//! '!' | length-byte | payload... | ck1 | ck2
//! ```
//!
//! - `length-byte = len(payload) + 34`; the bias keeps the byte in the
//!   printable range for short commands.
//! - The checksum covers `length-byte + payload`, not the leading marker.
//! - Replies carry a status byte as the first payload byte, so reply data
//!   sits at frame offset 3 through `len - 2`.
//!
//! ## Checksum
//!
//! A 14-bit shift-and-XOR running checksum, not a standard CRC-16 variant:
//! accumulator seeded with `0x3FFF`, each input byte XORed in, then eight
//! rounds of right-shift with conditional XOR of `0x2001` when the bit
//! shifted out was set. The two trailing bytes are `(acc & 0x7F) + 34` and
//! `(acc >> 7) + 34`.
//!
//! The algorithm, masks and bias constant are a fixed binary contract with
//! the instrument and must be reproduced bit-for-bit.

use crate::error::{DaqError, Result};

/// Leading frame marker, `'!'`.
pub const MARKER: u8 = 0x21;
/// Bias added to the length byte and to each checksum byte.
pub const BIAS: u8 = 34;

const CHECKSUM_SEED: u16 = 0x3FFF;
const CHECKSUM_MASK: u16 = 0x2001;

/// Computes the two checksum bytes over `data` (length byte + payload).
pub fn checksum(data: &[u8]) -> (u8, u8) {
    let mut acc = CHECKSUM_SEED;
    for &byte in data {
        acc ^= u16::from(byte);
        for _ in 0..8 {
            let carry = acc & 1 == 1;
            acc >>= 1;
            if carry {
                acc ^= CHECKSUM_MASK;
            }
        }
    }
    // acc never exceeds 14 bits, so each half fits a byte after the bias.
    (((acc & 0x7F) as u8).wrapping_add(BIAS), ((acc >> 7) as u8).wrapping_add(BIAS))
}

/// Builds an outbound frame around `payload`.
pub fn build(payload: &[u8]) -> Vec<u8> {
    let length_byte = (payload.len() as u8).wrapping_add(BIAS);
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(MARKER);
    frame.push(length_byte);
    frame.extend_from_slice(payload);
    let (ck1, ck2) = checksum(&frame[1..]);
    frame.push(ck1);
    frame.push(ck2);
    frame
}

/// Validates an inbound frame and returns its payload (everything between
/// the length byte and the checksum trailer).
///
/// For instrument replies the first payload byte is the response status;
/// the driver strips it. A marker/length/checksum mismatch is a
/// [`DaqError::Protocol`], which the drivers translate into a retry of the
/// whole request.
pub fn validate(frame: &[u8]) -> Result<&[u8]> {
    if frame.len() < 4 {
        return Err(DaqError::Protocol(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }
    if frame[0] != MARKER {
        return Err(DaqError::Protocol(format!(
            "bad frame marker: {:#04x}",
            frame[0]
        )));
    }
    let body = &frame[1..frame.len() - 2];
    let (ck1, ck2) = checksum(body);
    let trailer = &frame[frame.len() - 2..];
    if trailer != [ck1, ck2] {
        return Err(DaqError::Protocol(format!(
            "checksum mismatch: got {:02x} {:02x}, computed {:02x} {:02x}",
            trailer[0], trailer[1], ck1, ck2
        )));
    }
    Ok(&frame[2..frame.len() - 2])
}
