use std::time::Duration;

use thiserror::Error;

use crate::address::Address;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Access denied to process {pid}: {message}")]
    AccessDenied { pid: u32, message: String },

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Process {0} has exited")]
    ProcessExited(u32),

    #[error("Main module not found: {0}")]
    ModuleNotFound(String),

    #[error("Failed to read {requested} bytes at {address}: {message}")]
    ReadFault {
        address: Address,
        requested: usize,
        message: String,
    },

    #[error("Failed to write {len} bytes at {address}: {message}")]
    WriteFault {
        address: Address,
        len: usize,
        message: String,
    },

    #[error("Bytes at {address} changed since scan: expected {expected:02X?}, found {found:02X?}")]
    StaleCandidate {
        address: Address,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    #[error("{operation} did not complete within {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Invalid byte pattern: {0}")]
    InvalidPattern(String),

    #[error("{0} is only supported on Windows")]
    Unsupported(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a later session attempt against the same process may succeed.
    ///
    /// Only module resolution qualifies: the target may simply not have
    /// finished loading yet.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ModuleNotFound(_))
    }

    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
