//! Serial port transport built on the `serialport` crate.
//!
//! ## Configuration
//!
//! Each instrument section of the config file carries its own port
//! parameters, e.g.:
//!
//! ```toml
//! [tcu]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! parity = "even"
//! data_bits = 8
//! ```
//!
//! The deposition monitor additionally uses software flow control, which
//! is enabled with [`SerialTransport::with_flow_control`].

use crate::error::{DaqError, Result};
use crate::transport::Transport;
use log::{debug, trace};
use serde::Deserialize;
use std::io::{Read, Write};
use std::time::Duration;

/// Parity setting, deserialized straight from the config file.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

fn data_bits(bits: u8) -> Result<serialport::DataBits> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(DaqError::Configuration(format!(
            "unsupported data bits: {}",
            other
        ))),
    }
}

/// Blocking serial transport for RS-232/RS-485 links.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    parity: Parity,
    data_bits: u8,
    software_flow_control: bool,
    read_timeout: Duration,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    /// Default read timeout; bounds one tick's worth of waiting per read.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            parity: Parity::None,
            data_bits: 8,
            software_flow_control: false,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            port: None,
        }
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Enables XON/XOFF software flow control (the SQC310 requires it).
    pub fn with_flow_control(mut self) -> Self {
        self.software_flow_control = true;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| DaqError::Connection("serial port not open".to_string()))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        let flow = if self.software_flow_control {
            serialport::FlowControl::Software
        } else {
            serialport::FlowControl::None
        };
        let port = serialport::new(&self.port_name, self.baud_rate)
            .parity(self.parity.into())
            .data_bits(data_bits(self.data_bits)?)
            .flow_control(flow)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| {
                DaqError::Connection(format!(
                    "failed to open serial port '{}' at {} baud: {}",
                    self.port_name, self.baud_rate, e
                ))
            })?;
        self.port = Some(port);
        debug!(
            "Serial port '{}' opened at {} baud ({:?} parity)",
            self.port_name, self.baud_rate, self.parity
        );
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        trace!("serial tx {} bytes: {:02x?}", bytes.len(), bytes);
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let port = self.port_mut()?;
        let mut total = 0usize;

        // Nothing buffered yet: wait up to the read timeout for the first
        // byte, then drain whatever arrived with it.
        let buffered = port
            .bytes_to_read()
            .map_err(|e| DaqError::Communication(format!("serial status: {}", e)))?;
        if buffered == 0 {
            let mut first = [0u8; 1];
            match port.read(&mut first) {
                Ok(0) => return Ok(0),
                Ok(n) => {
                    buf.extend_from_slice(&first[..n]);
                    total += n;
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(0),
                Err(e) => return Err(e.into()),
            }
        }

        let pending = port
            .bytes_to_read()
            .map_err(|e| DaqError::Communication(format!("serial status: {}", e)))?
            as usize;
        if pending > 0 {
            let start = buf.len();
            buf.resize(start + pending, 0);
            let n = port.read(&mut buf[start..])?;
            buf.truncate(start + n);
            total += n;
        }
        if total > 0 {
            trace!("serial rx {} bytes: {:02x?}", total, &buf[buf.len() - total..]);
        }
        Ok(total)
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Serial port '{}' closed", self.port_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_mapping() {
        assert_eq!(serialport::Parity::Even, Parity::Even.into());
        assert_eq!(serialport::Parity::None, Parity::None.into());
    }

    #[test]
    fn test_data_bits_validation() {
        assert!(data_bits(8).is_ok());
        assert!(data_bits(9).is_err());
    }

    #[test]
    fn test_operations_require_open_port() {
        let mut transport = SerialTransport::new("/dev/null-port", 9600);
        assert!(transport.write_all(b"x").is_err());
        assert!(transport.read_available(&mut Vec::new()).is_err());
        assert!(transport.close().is_ok());
    }
}
