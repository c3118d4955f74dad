//! Inficon SQC310 quartz-crystal deposition monitor driver.
//!
//! Commands are short ASCII strings wrapped in the bias-34 checksum
//! framing of [`crate::protocol::frame`]:
//!
//! | command   | meaning                                      |
//! |-----------|----------------------------------------------|
//! | `@`       | firmware version                             |
//! | `L<ch>`   | deposition rate for sensor channel `<ch>`    |
//! | `N<ch>`   | film thickness                               |
//! | `P<ch>`   | crystal frequency                            |
//! | `PA<ch>`  | combined status / frequency / crystal life   |
//! | `A1 <n>?` | film name in slot `<n>`                      |
//!
//! Reply payloads carry a status byte ahead of the data; the driver strips
//! it and parses the remainder. A reply that never validates within the
//! retry bound is a protocol failure for that tick; a link that stays
//! quiet is a communication failure.

use crate::core::RetryPolicy;
use crate::error::{DaqError, Result};
use crate::instrument::exchange;
use crate::protocol::frame;
use crate::transport::Transport;
use anyhow::Context;
use log::debug;

/// Combined crystal statistics from the `PA` command.
#[derive(Clone, Debug, PartialEq)]
pub struct CrystalStats {
    /// Sensor status token as reported by the instrument.
    pub status: String,
    /// Crystal frequency in Hz.
    pub frequency: f64,
    /// Remaining crystal life in percent.
    pub life: f64,
}

/// Driver for the SQC310 family.
pub struct Sqc310<T: Transport> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> Sqc310<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Opens the underlying serial link.
    pub fn connect(&mut self) -> Result<()> {
        self.transport.open()
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.transport.close()
    }

    /// Sends one command and returns the reply data (status byte removed).
    fn comm(&mut self, command: &str) -> Result<Vec<u8>> {
        let request = frame::build(command.as_bytes());
        let device = format!("qcm command '{}'", command);
        let data = exchange(&mut self.transport, &self.retry, &device, &request, |buf| {
            let payload = frame::validate(buf)?;
            let data = payload
                .split_first()
                .map(|(_status, rest)| rest.to_vec())
                .context("reply payload missing status byte")?;
            Ok(data)
        })?;
        debug!("qcm '{}' -> {} data bytes", command, data.len());
        Ok(data)
    }

    fn query_f64(&mut self, command: &str) -> Result<f64> {
        let data = self.comm(command)?;
        let text = String::from_utf8_lossy(&data);
        text.trim().parse::<f64>().map_err(|e| {
            DaqError::Protocol(format!(
                "unparseable numeric reply to '{}': '{}' ({})",
                command,
                text.trim(),
                e
            ))
        })
    }

    /// Firmware version string.
    pub fn version(&mut self) -> Result<String> {
        let data = self.comm("@")?;
        Ok(String::from_utf8_lossy(&data).trim().to_string())
    }

    /// Deposition rate on a sensor channel, in the instrument's rate units.
    pub fn rate(&mut self, channel: u8) -> Result<f64> {
        self.query_f64(&format!("L{}", channel))
    }

    /// Accumulated film thickness on a sensor channel.
    pub fn thickness(&mut self, channel: u8) -> Result<f64> {
        self.query_f64(&format!("N{}", channel))
    }

    /// Crystal frequency on a sensor channel.
    pub fn frequency(&mut self, channel: u8) -> Result<f64> {
        self.query_f64(&format!("P{}", channel))
    }

    /// Combined crystal stats: status, frequency and remaining life,
    /// space-separated in the reply.
    pub fn crystal_stats(&mut self, channel: u8) -> Result<CrystalStats> {
        let command = format!("PA{}", channel);
        let data = self.comm(&command)?;
        let text = String::from_utf8_lossy(&data);
        let mut parts = text.split_whitespace();
        let (status, frequency, life) = match (parts.next(), parts.next(), parts.next()) {
            (Some(s), Some(f), Some(l)) => (s, f, l),
            _ => {
                return Err(DaqError::Protocol(format!(
                    "malformed crystal stats reply: '{}'",
                    text.trim()
                )))
            }
        };
        let parse = |field: &str, v: &str| {
            v.parse::<f64>().map_err(|e| {
                DaqError::Protocol(format!("bad {} in crystal stats '{}': {}", field, v, e))
            })
        };
        Ok(CrystalStats {
            status: status.to_string(),
            frequency: parse("frequency", frequency)?,
            life: parse("life", life)?,
        })
    }

    /// Film name stored in a film slot.
    pub fn film_name(&mut self, slot: u8) -> Result<String> {
        let data = self.comm(&format!("A1 {}?", slot))?;
        Ok(String::from_utf8_lossy(&data).trim().to_string())
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
