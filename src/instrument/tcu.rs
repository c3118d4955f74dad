//! Eurotherm TCU230S temperature controller driver.
//!
//! The TCU is a three-loop evaporation source controller built around
//! Eurotherm 3216 units on an RS-485 multidrop bus; each loop is one
//! Modbus unit address. Every operation resolves a named [`CommandSpec`]
//! from the driver's command table, converts between physical units and
//! register words with the register codec, and exchanges one Modbus RTU
//! frame over the transport.
//!
//! ## Register map (Eurotherm 3216, chapter 15)
//!
//! | command              | register | access | scale (reg/unit) |
//! |----------------------|----------|--------|------------------|
//! | `readTemperature`    | `0x001`  | R      | 10               |
//! | `readSetpoint`       | `0x002`  | R      | 10               |
//! | `setRemoteSetpoint`  | `0x01A`  | W      | 10               |
//! | `setRamp`/`readRamp` | `0x023`  | W/R    | 0.1              |
//! | `setRemoteMode`      | `0x114`  | W      | 1 (boolean)      |
//!
//! The output-power register is deliberately absent until its address is
//! confirmed; see DESIGN.md.
//!
//! ## Remote mode
//!
//! The instrument rejects remote setpoint writes while a loop is in local
//! mode, so [`Tcu::set_remote_setpoint`] switches the loop to remote first.
//! [`Tcu::release`] returns every loop to local mode; call it when a run
//! ends so the front-panel operator gets control back.

use crate::core::RetryPolicy;
use crate::error::{DaqError, Result};
use crate::instrument::exchange;
use crate::protocol::registers::{self, CommandSpec, Direction};
use crate::transport::Transport;
use anyhow::Context;
use log::{debug, info};
use rmodbus::client::ModbusRequest;
use rmodbus::{guess_response_frame_len, ModbusProto};

/// Command table shared read-only across all operations of this driver.
const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "readTemperature",
        direction: Direction::Read,
        address: 0x1,
        scale: 10.0,
        help: Some("Measured process value, 0.1 degree resolution"),
    },
    CommandSpec {
        name: "readSetpoint",
        direction: Direction::Read,
        address: 0x2,
        scale: 10.0,
        help: Some("Working setpoint"),
    },
    CommandSpec {
        name: "setRemoteSetpoint",
        direction: Direction::Write,
        address: 0x1A,
        scale: 10.0,
        help: Some("Alternative setpoint for remote operation; requires remote mode"),
    },
    CommandSpec {
        name: "setRamp",
        direction: Direction::Write,
        address: 0x23,
        scale: 0.1,
        help: Some("Setpoint ramp rate"),
    },
    CommandSpec {
        name: "readRamp",
        direction: Direction::Read,
        address: 0x23,
        scale: 0.1,
        help: None,
    },
    CommandSpec {
        name: "setRemoteMode",
        direction: Direction::Write,
        address: 0x114,
        scale: 1.0,
        help: Some("0 = local (front panel), 1 = remote setpoint select"),
    },
];

/// One controller loop on the bus: unit address plus current mode flag.
#[derive(Clone, Copy, Debug)]
pub struct ChannelHandle {
    pub unit: u8,
    pub remote: bool,
}

/// Driver for the TCU230S family.
pub struct Tcu<T: Transport> {
    transport: T,
    channels: Vec<ChannelHandle>,
    retry: RetryPolicy,
}

impl<T: Transport> Tcu<T> {
    /// Creates a driver for the given unit addresses. Channels start in
    /// local mode, mirroring the instrument's power-on state.
    pub fn new(transport: T, units: &[u8]) -> Self {
        Self {
            transport,
            channels: units
                .iter()
                .map(|&unit| ChannelHandle {
                    unit,
                    remote: false,
                })
                .collect(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Opens the underlying bus.
    pub fn connect(&mut self) -> Result<()> {
        self.transport.open()
    }

    /// Configured unit addresses, in bus order.
    pub fn units(&self) -> Vec<u8> {
        self.channels.iter().map(|c| c.unit).collect()
    }

    fn lookup(name: &str) -> Result<&'static CommandSpec> {
        COMMANDS
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| DaqError::InvalidCommand(name.to_string()))
    }

    fn handle_mut(&mut self, unit: u8) -> Result<&mut ChannelHandle> {
        self.channels
            .iter_mut()
            .find(|c| c.unit == unit)
            .ok_or_else(|| DaqError::InvalidCommand(format!("unit {} not configured", unit)))
    }

    /// Generic read of a named command: one holding register, decoded
    /// through the command's scale factor.
    pub fn read(&mut self, command: &str, unit: u8) -> Result<f64> {
        let spec = Self::lookup(command)?;
        if spec.direction != Direction::Read {
            return Err(DaqError::InvalidCommand(format!(
                "command '{}' is write-only",
                command
            )));
        }
        self.handle_mut(unit)?;
        let word = self.read_holding(spec.address, unit)?;
        let value = registers::decode(spec, word)?;
        debug!("tcu unit {}: {} = {}", unit, command, value);
        Ok(value)
    }

    /// Generic write of a named command, encoded through the command's
    /// scale factor.
    pub fn write(&mut self, command: &str, unit: u8, value: f64) -> Result<()> {
        let spec = Self::lookup(command)?;
        let word = registers::encode(spec, value)?;
        self.handle_mut(unit)?;
        self.write_holding(spec.address, word, unit)?;
        debug!("tcu unit {}: {} <- {} ({:#x})", unit, command, value, word);
        Ok(())
    }

    /// Measured process temperature in degrees.
    pub fn read_temperature(&mut self, unit: u8) -> Result<f64> {
        self.read("readTemperature", unit)
    }

    /// Switches a loop between local and remote setpoint select.
    pub fn set_remote(&mut self, unit: u8, remote: bool) -> Result<()> {
        self.write("setRemoteMode", unit, if remote { 1.0 } else { 0.0 })?;
        self.handle_mut(unit)?.remote = remote;
        info!(
            "tcu unit {} switched to {} mode",
            unit,
            if remote { "remote" } else { "local" }
        );
        Ok(())
    }

    /// Writes the remote setpoint, switching the loop to remote mode first
    /// if needed. The instrument rejects the write in local mode, so the
    /// ordering is mandatory.
    pub fn set_remote_setpoint(&mut self, unit: u8, temperature: f64) -> Result<()> {
        if !self.handle_mut(unit)?.remote {
            self.set_remote(unit, true)?;
        }
        self.write("setRemoteSetpoint", unit, temperature)
    }

    /// Sets the setpoint ramp rate.
    pub fn set_ramp(&mut self, unit: u8, rate: f64) -> Result<()> {
        self.write("setRamp", unit, rate)
    }

    /// Returns every loop to local mode and closes the bus. Errors on
    /// individual loops are reported but do not stop the sweep.
    pub fn release(&mut self) -> Result<()> {
        let units: Vec<u8> = self
            .channels
            .iter()
            .filter(|c| c.remote)
            .map(|c| c.unit)
            .collect();
        for unit in units {
            if let Err(e) = self.set_remote(unit, false) {
                log::warn!("tcu unit {}: failed to return to local mode: {}", unit, e);
            }
        }
        self.transport.close()
    }

    fn read_holding(&mut self, address: u16, unit: u8) -> Result<u16> {
        let mut mreq = ModbusRequest::new(unit, ModbusProto::Rtu);
        let mut request = Vec::new();
        mreq.generate_get_holdings(address, 1, &mut request)
            .map_err(|e| DaqError::Protocol(format!("modbus request build: {}", e)))?;
        let device = format!("tcu unit {}", unit);
        exchange(&mut self.transport, &self.retry, &device, &request, |buf| {
            let frame = complete_frame(buf)?;
            mreq.parse_ok(frame).context("modbus response")?;
            // fc3 reply: unit, fc, byte count, data..., crc16
            let count = frame[2] as usize;
            let data = frame
                .get(3..3 + count)
                .context("truncated register payload")?;
            let word = data
                .get(..2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .context("empty register payload")?;
            Ok(word)
        })
    }

    fn write_holding(&mut self, address: u16, value: u16, unit: u8) -> Result<()> {
        let mut mreq = ModbusRequest::new(unit, ModbusProto::Rtu);
        let mut request = Vec::new();
        mreq.generate_set_holding(address, value, &mut request)
            .map_err(|e| DaqError::Protocol(format!("modbus request build: {}", e)))?;
        let device = format!("tcu unit {}", unit);
        exchange(&mut self.transport, &self.retry, &device, &request, |buf| {
            let frame = complete_frame(buf)?;
            mreq.parse_ok(frame).context("modbus response")?;
            Ok(())
        })
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Slices one complete RTU frame off the front of the receive buffer.
fn complete_frame(buf: &[u8]) -> anyhow::Result<&[u8]> {
    let expected = guess_response_frame_len(buf, ModbusProto::Rtu).context("frame header")? as usize;
    buf.get(..expected)
        .with_context(|| format!("short modbus frame: {} of {} bytes", buf.len(), expected))
}
