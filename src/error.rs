//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to classify failures, which matters here because the
//! acquisition engine treats different classes very differently:
//!
//! - **`Connection`**: a transport could not be opened. Fatal; a run never
//!   starts with a dead link.
//! - **`Communication`**: an instrument produced no reply within the retry
//!   bound. Isolated to one channel for one tick.
//! - **`Protocol`**: an instrument replied, but the reply never validated
//!   (bad checksum, malformed payload) within the retry bound. Isolated to
//!   one channel for one tick.
//! - **`InvalidCommand`**: a command name or value outside a driver's
//!   command table. Programming error, fatal.
//! - **`LogExists`**: the sample log path is already occupied. Fatal before
//!   the first tick; existing data is never overwritten.
//! - **`Config` / `Configuration` / `Io` / `Csv`**: ambient wrappers for the
//!   configuration and storage layers.
//!
//! By using `#[from]`, `DaqError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the application with
//! the `?` operator.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type Result<T> = std::result::Result<T, DaqError>;

/// Application error type. See the module docs for the classification rules.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Communication error: no reply from {0} within the retry bound")]
    Communication(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Sample log already exists at {0}, refusing to overwrite")]
    LogExists(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}

impl DaqError {
    /// Returns true for errors the engine isolates to a single channel for
    /// a single tick instead of aborting the run.
    pub fn is_channel_isolated(&self) -> bool {
        matches!(self, DaqError::Communication(_) | DaqError::Protocol(_))
    }
}
