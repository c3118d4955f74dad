//! Instrument drivers.
//!
//! Each driver pairs one wire codec with one [`Transport`] and exposes
//! typed operations per logical channel/unit address:
//!
//! - [`Tcu`]: Eurotherm TCU230S temperature controller family, register
//!   mapped over Modbus RTU (RS-485 multidrop, one unit address per loop).
//! - [`Sqc310`]: Inficon SQC310 quartz-crystal deposition monitor,
//!   byte-framed checksum protocol.
//! - [`Tpg261`]: Pfeiffer TPG261 pressure gauge, ACK/ENQ mnemonic protocol.

pub mod sqc310;
pub mod tcu;
pub mod tpg261;

pub use sqc310::{CrystalStats, Sqc310};
pub use tcu::{ChannelHandle, Tcu};
pub use tpg261::Tpg261;

use crate::core::RetryPolicy;
use crate::error::{DaqError, Result};
use crate::transport::Transport;
use log::debug;

/// One request/reply exchange under the contractual retry discipline.
///
/// Writes `request`, waits the inter-attempt delay, drains the link and
/// hands the bytes to `parse`. A quiet link or a parse failure consumes one
/// attempt; after the bound the failure is classified: no bytes ever seen is
/// [`DaqError::Communication`], bytes seen but never valid is
/// [`DaqError::Protocol`]. Both are isolated per channel per tick by the
/// engine.
pub(crate) fn exchange<R>(
    transport: &mut dyn Transport,
    retry: &RetryPolicy,
    device: &str,
    request: &[u8],
    mut parse: impl FnMut(&[u8]) -> anyhow::Result<R>,
) -> Result<R> {
    let mut saw_reply = false;
    let mut last_error = String::new();
    for attempt in 1..=retry.attempts {
        transport
            .write_all(request)
            .map_err(|e| DaqError::Communication(format!("{}: {}", device, e)))?;
        std::thread::sleep(retry.delay);

        let mut reply = Vec::new();
        transport
            .read_available(&mut reply)
            .map_err(|e| DaqError::Communication(format!("{}: {}", device, e)))?;
        if reply.is_empty() {
            debug!("{}: no reply on attempt {}/{}", device, attempt, retry.attempts);
            continue;
        }
        saw_reply = true;
        match parse(&reply) {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_error = e.to_string();
                debug!(
                    "{}: invalid reply on attempt {}/{}: {}",
                    device, attempt, retry.attempts, last_error
                );
            }
        }
    }
    if saw_reply {
        Err(DaqError::Protocol(format!(
            "{}: no valid reply in {} attempts (last: {})",
            device, retry.attempts, last_error
        )))
    } else {
        Err(DaqError::Communication(device.to_string()))
    }
}
