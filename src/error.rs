//! Error types and handling for the ZBM driver
//!
//! This module defines the error types used throughout the crate, including the
//! two transport outcomes (timeout and protocol exception) that the acquisition
//! state machine reacts to.

use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, ZbmError>;

/// Main error type for the ZBM driver
#[derive(Debug, Error)]
pub enum ZbmError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Modbus link errors (port not open, framing, I/O on the serial line)
    #[error("Modbus error: {message}")]
    Modbus { message: String },

    /// The device answered with a Modbus exception response
    #[error("Modbus exception: code {code:#04x}")]
    Exception { code: u8 },

    /// No reply arrived within the response timeout
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },
}

impl ZbmError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ZbmError::Config {
            message: message.into(),
        }
    }

    /// Create a new Modbus error
    pub fn modbus<S: Into<String>>(message: S) -> Self {
        ZbmError::Modbus {
            message: message.into(),
        }
    }

    /// Create a new exception error from a raw Modbus exception code
    pub fn exception(code: u8) -> Self {
        ZbmError::Exception { code }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        ZbmError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        ZbmError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ZbmError::Io {
            message: message.into(),
        }
    }


    /// Whether this error is a protocol exception reply from the device
    pub fn is_exception(&self) -> bool {
        matches!(self, ZbmError::Exception { .. })
    }
}

impl From<std::io::Error> for ZbmError {
    fn from(err: std::io::Error) -> Self {
        ZbmError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ZbmError {
    fn from(err: serde_yaml::Error) -> Self {
        ZbmError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ZbmError {
    fn from(err: serde_json::Error) -> Self {
        ZbmError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<tokio_serial::Error> for ZbmError {
    fn from(err: tokio_serial::Error) -> Self {
        ZbmError::modbus(format!("Serial port error: {}", err))
    }
}
