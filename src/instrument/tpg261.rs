//! Pfeiffer TPG261 pressure gauge driver.
//!
//! The TPG speaks a line-oriented mnemonic protocol with a two-step
//! handshake: send `PR<g>\r\n`, wait for `ACK`, then send `ENQ` to fetch
//! the measurement, which arrives as `<status>,<value>\r\n` with the value
//! in scientific notation (mbar).
//!
//! Gauge status codes: 0 ok, 1 underrange, 2 overrange, 3 sensor error,
//! 4 sensor off, 5 no sensor, 6 identification error. Under/overrange
//! still deliver a usable value; the rest are protocol failures for the
//! tick.

use crate::core::RetryPolicy;
use crate::error::{DaqError, Result};
use crate::instrument::exchange;
use crate::transport::Transport;
use anyhow::Context;

const ACK: u8 = 0x06;
const NAK: u8 = 0x15;
const ENQ: u8 = 0x05;

/// Driver for the TPG261 single/dual gauge controller.
pub struct Tpg261<T: Transport> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> Tpg261<T> {
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

    pub fn connect(&mut self) -> Result<()> {
        self.transport.open()
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.transport.close()
    }

    /// Reads the pressure on gauge `gauge` (1 or 2), in mbar.
    pub fn pressure_gauge(&mut self, gauge: u8) -> Result<f64> {
        if !(1..=2).contains(&gauge) {
            return Err(DaqError::InvalidCommand(format!(
                "gauge {} out of range (1-2)",
                gauge
            )));
        }
        let device = format!("pressure gauge {}", gauge);

        // Step 1: announce the measurement request, expect ACK.
        let mnemonic = format!("PR{}\r\n", gauge);
        exchange(
            &mut self.transport,
            &self.retry,
            &device,
            mnemonic.as_bytes(),
            |buf| {
                if buf.contains(&NAK) {
                    anyhow::bail!("gauge rejected PR{} with NAK", gauge);
                }
                buf.contains(&ACK)
                    .then_some(())
                    .context("no ACK in gauge reply")
            },
        )?;

        // Step 2: ENQ fetches "<status>,<value>\r\n".
        let value = exchange(&mut self.transport, &self.retry, &device, &[ENQ], |buf| {
            let text = String::from_utf8_lossy(buf);
            let line = text.trim();
            let (status, value) = line
                .split_once(',')
                .with_context(|| format!("malformed gauge reply: '{}'", line))?;
            let status: u8 = status.trim().parse().context("gauge status")?;
            // 0 ok; under/overrange still carry a real reading.
            if status > 2 {
                anyhow::bail!("gauge status {} for reply '{}'", status, line);
            }
            value.trim().parse::<f64>().context("gauge value")
        })?;
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_pressure_read_handshake() {
        let mut transport = MockTransport::new();
        transport.queue_reply(vec![ACK, b'\r', b'\n']);
        transport.queue_reply(b"0,+1.0200E-06\r\n".to_vec());
        let mut gauge = Tpg261::new(transport).with_retry(fast_retry());

        let mbar = gauge.pressure_gauge(1).unwrap();
        assert!((mbar - 1.02e-6).abs() < 1e-12);

        let writes = &gauge.transport_mut().writes;
        assert_eq!(writes[0], b"PR1\r\n");
        assert_eq!(writes[1], [ENQ]);
    }

    #[test]
    fn test_nak_is_protocol_failure() {
        let mut transport = MockTransport::new();
        for _ in 0..3 {
            transport.queue_reply(vec![NAK, b'\r', b'\n']);
        }
        let mut gauge = Tpg261::new(transport).with_retry(fast_retry());
        assert!(matches!(
            gauge.pressure_gauge(1),
            Err(DaqError::Protocol(_))
        ));
    }

    #[test]
    fn test_sensor_error_status_rejected() {
        let mut transport = MockTransport::new();
        transport.queue_reply(vec![ACK]);
        for _ in 0..3 {
            transport.queue_reply(b"3,+1.0000E+03\r\n".to_vec());
        }
        let mut gauge = Tpg261::new(transport).with_retry(fast_retry());
        assert!(matches!(
            gauge.pressure_gauge(1),
            Err(DaqError::Protocol(_))
        ));
    }

    #[test]
    fn test_underrange_still_delivers_value() {
        let mut transport = MockTransport::new();
        transport.queue_reply(vec![ACK]);
        transport.queue_reply(b"1,+5.0000E-10\r\n".to_vec());
        let mut gauge = Tpg261::new(transport).with_retry(fast_retry());
        assert_eq!(gauge.pressure_gauge(1).unwrap(), 5.0e-10);
    }

    #[test]
    fn test_quiet_gauge_is_communication_failure() {
        let transport = MockTransport::new();
        let mut gauge = Tpg261::new(transport).with_retry(fast_retry());
        assert!(matches!(
            gauge.pressure_gauge(2),
            Err(DaqError::Communication(_))
        ));
        assert_eq!(gauge.transport_mut().writes.len(), 3);
    }

    #[test]
    fn test_invalid_gauge_number() {
        let mut gauge = Tpg261::new(MockTransport::new());
        assert!(matches!(
            gauge.pressure_gauge(3),
            Err(DaqError::InvalidCommand(_))
        ));
    }
}
