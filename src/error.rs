//! Error types for moxaprov.

use std::io;
use thiserror::Error;

/// Main error type for moxaprov operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Provisioning configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Transport layer errors (SSH connection, authentication).
///
/// These never cross the session boundary: the session's connection worker
/// catches them, reports them through the log sink, and clears the liveness
/// flag. Callers observe the failure as `ConnectionLost` or a liveness-wait
/// timeout, not as an error value.
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Provisioning configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required field is empty or missing
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Result type alias using moxaprov's Error.
pub type Result<T> = std::result::Result<T, Error>;
