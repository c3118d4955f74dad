//! Channel samplers: the uniform polling face over heterogeneous drivers.
//!
//! A sampler owns (or shares) one driver and maps one poll into a fixed set
//! of metric columns. The engine only ever sees this trait, so a failing
//! instrument, a disabled channel and a gauge with a substitute value all
//! look the same at the loop boundary.

use crate::error::Result;
use crate::instrument::{Sqc310, Tcu, Tpg261};
use crate::transport::Transport;
use std::sync::{Arc, Mutex};

/// One logical telemetry channel.
///
/// `columns()` is fixed for the life of the sampler and `sample()` returns
/// exactly one value per column. `fallback()` supplies the per-column
/// substitutes used when `sample()` fails with an isolatable error.
pub trait ChannelSampler: Send {
    /// Stable channel name, used in health reporting.
    fn name(&self) -> String;
    /// Metric column names contributed to every record, in order.
    fn columns(&self) -> Vec<String>;
    /// Polls the instrument once.
    fn sample(&mut self) -> Result<Vec<Option<f64>>>;
    /// Values substituted for a failed poll; same arity as `columns()`.
    fn fallback(&self) -> Vec<Option<f64>> {
        vec![None; self.columns().len()]
    }
}

/// One TCU temperature loop. Several samplers share one RS-485 bus, so the
/// driver sits behind a mutex; polling is sequential within a tick, so the
/// lock is uncontended in practice.
pub struct TemperatureSampler<T: Transport> {
    tcu: Arc<Mutex<Tcu<T>>>,
    unit: u8,
}

impl<T: Transport> TemperatureSampler<T> {
    pub fn new(tcu: Arc<Mutex<Tcu<T>>>, unit: u8) -> Self {
        Self { tcu, unit }
    }
}

impl<T: Transport> ChannelSampler for TemperatureSampler<T> {
    fn name(&self) -> String {
        format!("tcu unit {}", self.unit)
    }

    fn columns(&self) -> Vec<String> {
        vec![format!("temp_{}", self.unit)]
    }

    fn sample(&mut self) -> Result<Vec<Option<f64>>> {
        let mut tcu = self.tcu.lock().unwrap_or_else(|e| e.into_inner());
        let temperature = tcu.read_temperature(self.unit)?;
        Ok(vec![Some(temperature)])
    }
}

/// One QCM sensor channel: deposition rate plus accumulated thickness.
pub struct DepositionSampler<T: Transport> {
    qcm: Arc<Mutex<Sqc310<T>>>,
    channel: u8,
}

impl<T: Transport> DepositionSampler<T> {
    pub fn new(qcm: Arc<Mutex<Sqc310<T>>>, channel: u8) -> Self {
        Self { qcm, channel }
    }
}

impl<T: Transport> ChannelSampler for DepositionSampler<T> {
    fn name(&self) -> String {
        format!("qcm channel {}", self.channel)
    }

    fn columns(&self) -> Vec<String> {
        vec![
            format!("rate_{}", self.channel),
            format!("thick_{}", self.channel),
        ]
    }

    fn sample(&mut self) -> Result<Vec<Option<f64>>> {
        let mut qcm = self.qcm.lock().unwrap_or_else(|e| e.into_inner());
        let rate = qcm.rate(self.channel)?;
        let thickness = qcm.thickness(self.channel)?;
        Ok(vec![Some(rate), Some(thickness)])
    }
}

/// Chamber pressure. A failed gauge read substitutes a configured constant
/// (atmospheric by default) rather than the missing sentinel, so downstream
/// plots stay continuous.
pub struct PressureSampler<T: Transport> {
    gauge: Tpg261<T>,
    gauge_number: u8,
    fallback_mbar: f64,
}

impl<T: Transport> PressureSampler<T> {
    pub fn new(gauge: Tpg261<T>, gauge_number: u8, fallback_mbar: f64) -> Self {
        Self {
            gauge,
            gauge_number,
            fallback_mbar,
        }
    }
}

impl<T: Transport> ChannelSampler for PressureSampler<T> {
    fn name(&self) -> String {
        "pressure gauge".to_string()
    }

    fn columns(&self) -> Vec<String> {
        vec!["pressure".to_string()]
    }

    fn sample(&mut self) -> Result<Vec<Option<f64>>> {
        let mbar = self.gauge.pressure_gauge(self.gauge_number)?;
        Ok(vec![Some(mbar)])
    }

    fn fallback(&self) -> Vec<Option<f64>> {
        vec![Some(self.fallback_mbar)]
    }
}

/// Placeholder for a channel present in the column layout but switched off
/// in config. Keeps the column count constant across configurations.
pub struct DisabledChannel {
    name: String,
    columns: Vec<String>,
}

impl DisabledChannel {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

impl ChannelSampler for DisabledChannel {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn sample(&mut self) -> Result<Vec<Option<f64>>> {
        Ok(vec![None; self.columns.len()])
    }
}
