//! Error types for mculog.
//!
//! This module defines all error types used throughout the mculog crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for mculog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A message filter pattern failed to compile.
    #[error("invalid filter pattern: {0}")]
    FilterPattern(#[from] regex::Error),

    // === UART Errors ===
    /// The UART port rejected a transfer.
    #[error("UART port {port} transmit failed: {message}")]
    UartTransmit {
        /// Identifier of the port.
        port: u32,
        /// Description of what went wrong.
        message: String,
    },

    /// A transfer was requested while another is still in flight.
    #[error("UART port {port} is busy")]
    UartBusy {
        /// Identifier of the port.
        port: u32,
    },

    /// The port has been closed and accepts no more transfers.
    #[error("UART port {port} is closed")]
    UartClosed {
        /// Identifier of the port.
        port: u32,
    },

    // === Sink Errors ===
    /// A log sink failed to write or flush.
    #[error("sink '{name}' failed: {message}")]
    Sink {
        /// Name of the sink.
        name: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Failed to open the log file.
    #[error("failed to open log file {path}: {source}")]
    FileOpen {
        /// Path to the log file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Logger Errors ===
    /// No global logger has been installed.
    #[error("global logger is not installed")]
    NotInstalled,

    /// A global logger has already been installed.
    #[error("global logger is already installed")]
    AlreadyInstalled,

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for mculog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a UART transmit error.
    #[must_use]
    pub fn uart_transmit(port: u32, message: impl Into<String>) -> Self {
        Self::UartTransmit {
            port,
            message: message.into(),
        }
    }

    /// Create a sink error.
    #[must_use]
    pub fn sink(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sink {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Check if this error reports a transfer already in flight.
    #[must_use]
    pub fn is_uart_busy(&self) -> bool {
        matches!(self, Self::UartBusy { .. })
    }

    /// Check if this error came from the UART layer.
    #[must_use]
    pub fn is_uart_error(&self) -> bool {
        matches!(
            self,
            Self::UartTransmit { .. } | Self::UartBusy { .. } | Self::UartClosed { .. }
        )
    }
}
