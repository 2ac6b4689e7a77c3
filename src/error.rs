//! Error types for Lightlog

use std::fmt;

/// Result type alias for Lightlog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Lightlog
#[derive(Debug)]
pub enum Error {
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// A write carried a field that is not a finite float
    InvalidSample(String),
    /// Read path date components are not a valid calendar date
    InvalidDate(String),
    /// Thing name would escape the store root or is empty
    InvalidThing(String),
    /// External hook could not be rendered or spawned
    Hook(String),
    /// Internal error
    Internal(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidSample(msg) => write!(f, "Invalid sample: {}", msg),
            Error::InvalidDate(msg) => write!(f, "Invalid date: {}", msg),
            Error::InvalidThing(msg) => write!(f, "Invalid thing name: {}", msg),
            Error::Hook(msg) => write!(f, "Hook error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("blocking task failed: {}", e))
    }
}
