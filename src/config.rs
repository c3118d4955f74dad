//! Run configuration, loaded from a TOML file.
//!
//! Layout mirrors the instrument topology: one `[monitor]` block for the
//! polling loop plus one block per instrument bus. All settings are
//! validated after deserialization so a bad file fails before any port is
//! opened.

use crate::error::{DaqError, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use crate::transport::Parity;

const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

/// Upper unit address on the TCU's RS-485 bus.
const TCU_MAX_UNIT: u8 = 3;
/// Sensor channel count on the SQC310.
const QCM_MAX_CHANNEL: u8 = 6;

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub tcu: TcuSettings,
    pub qcm: QcmSettings,
    pub pressure: PressureSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MonitorSettings {
    /// Polling cadence.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Run length bound; `None` runs until stopped.
    #[serde(default)]
    pub max_samples: Option<u64>,
    /// Directory for timestamped log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

/// One instrument channel in the column layout. A channel with
/// `enabled = false` keeps its columns in every record (filled with the
/// missing sentinel) but is never polled, so switching a source off does
/// not change the log schema between runs.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ChannelConfig {
    pub id: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn enabled_ids(channels: &[ChannelConfig]) -> Vec<u8> {
    channels
        .iter()
        .filter(|c| c.enabled)
        .map(|c| c.id)
        .collect()
}

#[derive(Clone, Debug, Deserialize)]
pub struct TcuSettings {
    pub port: String,
    #[serde(default = "default_tcu_baud")]
    pub baud_rate: u32,
    #[cfg(feature = "instrument_serial")]
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Unit addresses in column order.
    pub channels: Vec<ChannelConfig>,
}

impl TcuSettings {
    /// Unit addresses that are actually polled.
    pub fn enabled_units(&self) -> Vec<u8> {
        enabled_ids(&self.channels)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct QcmSettings {
    pub port: String,
    #[serde(default = "default_qcm_baud")]
    pub baud_rate: u32,
    /// Sensor channels in column order.
    pub channels: Vec<ChannelConfig>,
}

impl QcmSettings {
    /// Sensor channels that are actually polled.
    pub fn enabled_channels(&self) -> Vec<u8> {
        enabled_ids(&self.channels)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PressureSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub port: String,
    #[serde(default = "default_tcu_baud")]
    pub baud_rate: u32,
    #[serde(default = "default_gauge")]
    pub gauge: u8,
    /// Value substituted when the gauge read fails; atmospheric by default.
    #[serde(default = "default_fallback_mbar")]
    pub fallback_mbar: f64,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_tcu_baud() -> u32 {
    9600
}

fn default_qcm_baud() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_true() -> bool {
    true
}

fn default_gauge() -> u8 {
    1
}

fn default_fallback_mbar() -> f64 {
    1010.0
}

impl Settings {
    /// Loads and validates settings from `path`, or from the default
    /// config file when no path is given.
    pub fn new(path: Option<&str>) -> Result<Self> {
        let file = path.unwrap_or(DEFAULT_CONFIG_FILE);
        let settings: Settings = Config::builder()
            .add_source(File::with_name(file))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.tick_interval.is_zero() {
            return Err(DaqError::Configuration(
                "monitor.tick_interval must be positive".to_string(),
            ));
        }
        if self.tcu.enabled_units().is_empty()
            && self.qcm.enabled_channels().is_empty()
            && !self.pressure.enabled
        {
            return Err(DaqError::Configuration(
                "no channels enabled".to_string(),
            ));
        }
        if !(5..=8).contains(&self.tcu.data_bits) {
            return Err(DaqError::Configuration(format!(
                "tcu.data_bits {} out of range (5-8)",
                self.tcu.data_bits
            )));
        }
        Self::check_channels("tcu", &self.tcu.channels, TCU_MAX_UNIT)?;
        Self::check_channels("qcm", &self.qcm.channels, QCM_MAX_CHANNEL)?;
        Ok(())
    }

    fn check_channels(section: &str, channels: &[ChannelConfig], max: u8) -> Result<()> {
        for (i, channel) in channels.iter().enumerate() {
            if channel.id == 0 || channel.id > max {
                return Err(DaqError::Configuration(format!(
                    "{}.channels[{}] = {} out of range (1-{})",
                    section, i, channel.id, max
                )));
            }
            if channels[..i].iter().any(|c| c.id == channel.id) {
                return Err(DaqError::Configuration(format!(
                    "{}.channels contains duplicate {}",
                    section, channel.id
                )));
            }
        }
        Ok(())
    }
}
