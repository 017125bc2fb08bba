//! Error handling for the softsym library
//!
//! This module provides a unified error type for all operations in the
//! library, covering I/O, configuration validation, source and sink
//! faults, and input format problems.

use std::fmt;
use std::io;

/// A specialized Result type for softsym operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for softsym operations
#[derive(Debug)]
pub enum Error {
    /// I/O error (file operations, etc.)
    Io(io::Error),

    /// Invalid demodulator configuration, reported at init time
    Config(String),

    /// Sample source misbehaved (impossible block size, backend fault)
    Source(String),

    /// Output sink could not be opened or written
    Sink(io::Error),

    /// Malformed input data (WAV header, raw I/Q framing)
    Format(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Source(msg) => write!(f, "Source error: {}", msg),
            Error::Sink(err) => write!(f, "Sink error: {}", err),
            Error::Format(msg) => write!(f, "Format error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Sink(err) => Some(err),
            _ => None,
        }
    }
}

// From conversions for common error types

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

// Helper constructors for common error scenarios

impl Error {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a source error with a custom message
    pub fn source<S: Into<String>>(msg: S) -> Self {
        Error::Source(msg.into())
    }

    /// Create a format error with a custom message
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Error::Format(msg.into())
    }
}
