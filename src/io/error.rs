// src/io/error.rs
//
// Error taxonomy for the serial link and the text protocol riding on it.
// Every variant is recoverable: callers log it and fall back to the previous
// known-good state rather than aborting.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum IoError {
    /// Open/read/write failure on a device. The link is closed afterwards.
    Connection { device: String, message: String },
    /// Malformed protocol content (geometry dump, face request, ...).
    Protocol { source: String, message: String },
    /// Invalid settings or arguments.
    Configuration(String),
}

impl IoError {
    pub fn connection(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn protocol(source: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Protocol {
            source: source.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        IoError::Configuration(message.into())
    }

    /// True for errors that mean the link is gone.
    pub fn is_connection(&self) -> bool {
        matches!(self, IoError::Connection { .. })
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Connection { device, message } => {
                write!(f, "{}: connection error: {}", device, message)
            }
            IoError::Protocol { source, message } => {
                write!(f, "{}: protocol error: {}", source, message)
            }
            IoError::Configuration(message) => write!(f, "configuration error: {}", message),
        }
    }
}

impl std::error::Error for IoError {}

impl From<IoError> for String {
    fn from(e: IoError) -> Self {
        e.to_string()
    }
}
