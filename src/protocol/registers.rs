//! Fixed-point register codec for the register-mapped controller family.
//!
//! Eurotherm-style controllers expose every parameter as a 16-bit holding
//! register holding the physical value times a per-command scale factor
//! (temperatures in tenths of a degree, ramp rates in ten-unit steps, ...).
//! A [`CommandSpec`] pins the register address, the access direction and
//! that scale factor; the codec is the only place the conversion happens,
//! so the direction and rounding mode cannot silently drift between call
//! sites.
//!
//! Scale is expressed as register units per physical unit: encoding
//! multiplies, decoding divides, and a stored `235` with scale `10` decodes
//! to `23.5` exactly.

use crate::error::{DaqError, Result};

/// Register access direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One entry in a driver's command table. Immutable; defined per driver at
/// construction and shared read-only across all of its operations.
#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    /// Command name used for lookup (e.g. `"readTemperature"`).
    pub name: &'static str,
    pub direction: Direction,
    /// Holding register address.
    pub address: u16,
    /// Register units per physical unit. Must be non-zero.
    pub scale: f64,
    pub help: Option<&'static str>,
}

impl CommandSpec {
    /// Rejects the (invalid) zero scale before any conversion uses it.
    pub fn check(&self) -> Result<()> {
        if self.scale == 0.0 {
            return Err(DaqError::InvalidCommand(format!(
                "command '{}' has a zero scale factor",
                self.name
            )));
        }
        Ok(())
    }
}

/// Encodes a physical value into a register word for a write command.
///
/// Rounds half away from zero to the nearest register unit; values that do
/// not fit the 16-bit register are a caller error, not something to clamp.
pub fn encode(spec: &CommandSpec, physical: f64) -> Result<u16> {
    spec.check()?;
    if spec.direction != Direction::Write {
        return Err(DaqError::InvalidCommand(format!(
            "command '{}' is read-only",
            spec.name
        )));
    }
    let word = (physical * spec.scale).round();
    if !(0.0..=f64::from(u16::MAX)).contains(&word) {
        return Err(DaqError::InvalidCommand(format!(
            "value {} out of register range for command '{}'",
            physical, spec.name
        )));
    }
    Ok(word as u16)
}

/// Decodes a register word read from the instrument into a physical value.
pub fn decode(spec: &CommandSpec, word: u16) -> Result<f64> {
    spec.check()?;
    Ok(f64::from(word) / spec.scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_TEMP: CommandSpec = CommandSpec {
        name: "readTemperature",
        direction: Direction::Read,
        address: 0x1,
        scale: 10.0,
        help: None,
    };

    const SET_SP: CommandSpec = CommandSpec {
        name: "setRemoteSetpoint",
        direction: Direction::Write,
        address: 0x1A,
        scale: 10.0,
        help: None,
    };

    const SET_RAMP: CommandSpec = CommandSpec {
        name: "setRamp",
        direction: Direction::Write,
        address: 0x23,
        scale: 0.1,
        help: None,
    };

    #[test]
    fn test_decode_reproduces_instrument_scaling() {
        // Register 235 at 10 reg/degree is 23.5 degrees.
        assert_eq!(decode(&READ_TEMP, 235).unwrap(), 23.5);
        assert_eq!(decode(&READ_TEMP, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_encode_rounds_to_register_units() {
        assert_eq!(encode(&SET_SP, 23.5).unwrap(), 235);
        assert_eq!(encode(&SET_SP, 23.54).unwrap(), 235);
        assert_eq!(encode(&SET_SP, 23.56).unwrap(), 236);
        assert_eq!(encode(&SET_RAMP, 50.0).unwrap(), 5);
    }

    #[test]
    fn test_scale_round_trip_within_one_register_unit() {
        for spec in [&SET_SP, &SET_RAMP] {
            for i in 0..200 {
                let x = f64::from(i) * 1.37;
                let word = encode(spec, x).unwrap();
                let back = f64::from(word) / spec.scale;
                assert!(
                    (back - x).abs() * spec.scale <= 0.5 + 1e-9,
                    "{} -> {} -> {} (scale {})",
                    x,
                    word,
                    back,
                    spec.scale
                );
            }
        }
    }

    #[test]
    fn test_encode_rejects_read_only_command() {
        assert!(matches!(
            encode(&READ_TEMP, 20.0),
            Err(DaqError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_encode_rejects_out_of_range_value() {
        assert!(matches!(
            encode(&SET_SP, 1e6),
            Err(DaqError::InvalidCommand(_))
        ));
        assert!(matches!(
            encode(&SET_SP, -5.0),
            Err(DaqError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_zero_scale_rejected() {
        let broken = CommandSpec {
            name: "broken",
            direction: Direction::Write,
            address: 0x0,
            scale: 0.0,
            help: None,
        };
        assert!(broken.check().is_err());
        assert!(encode(&broken, 1.0).is_err());
        assert!(decode(&broken, 1).is_err());
    }
}
