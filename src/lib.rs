//! Core library for the echo-daq acquisition application.
//!
//! Telemetry acquisition for a thermal evaporation chamber: temperature
//! loops on a Eurotherm TCU230S (Modbus RTU), deposition rate/thickness
//! from an Inficon SQC310 quartz-crystal monitor, and chamber pressure
//! from a Pfeiffer TPG261 gauge, polled on a fixed cadence into an
//! append-only CSV time series.

pub mod config;
pub mod core;
pub mod error;
pub mod instrument;
pub mod monitor;
pub mod protocol;
pub mod storage;
pub mod transport;

pub use error::{DaqError, Result};
