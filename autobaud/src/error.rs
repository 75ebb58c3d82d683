//! Error types for autobaud.

use std::io;
use thiserror::Error;

/// Result type for autobaud operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for autobaud operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on an open serial session.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error reported by the native driver layer.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The port registry could not be queried.
    #[error("Port enumeration failed: {0}")]
    Enumeration(String),

    /// Transport-level failure not covered by `Io`/`Serial` (busy, closed, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The search was cancelled by the caller.
    #[error("Operation interrupted")]
    Interrupted,

    /// Invalid probe configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}
