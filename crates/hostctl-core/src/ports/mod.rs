//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No process or filesystem types in any signature
//! - One-shot commands go through `CommandRunner`; long-lived processes
//!   are a runtime concern
//! - Storage is an opaque byte-oriented key-value map

pub mod command_runner;
pub mod kv_store;
pub mod token_verifier;

use thiserror::Error;

pub use command_runner::{CommandOutput, CommandRunner};
pub use kv_store::KeyValueStore;
pub use token_verifier::{StaticTokenVerifier, TokenVerifier};

#[cfg(any(test, feature = "test-utils"))]
pub use command_runner::MockCommandRunner;
#[cfg(any(test, feature = "test-utils"))]
pub use kv_store::MockKeyValueStore;

/// Errors raised by durable storage.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Underlying storage could not be read or written.
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors for process spawning, streaming, and job tracking.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The executable is missing, not permitted, or the source is unavailable.
    #[error("Failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },

    /// The process or channel has already terminated.
    #[error("Closed: {0}")]
    Closed(String),

    /// The subscriber fell too far behind and was disconnected.
    #[error("Subscriber {subscriber} disconnected: consumer too slow")]
    SlowConsumer { subscriber: u64 },

    /// No session or job with this identifier.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A target name or job request was rejected before any process started.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O failure on an already running process.
    #[error("I/O error: {0}")]
    Io(String),
}

impl StreamError {
    pub fn spawn(command: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Spawn {
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Core error type for semantic domain errors.
///
/// Adapters map this to their own error types (HTTP status codes, CLI exit
/// codes).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Settings validation error.
    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),

    /// Path resolution error.
    #[error(transparent)]
    Path(#[from] crate::paths::PathError),

    /// Validation error (invalid input).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error (unexpected condition).
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_names_command() {
        let err = StreamError::spawn("journalctl", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "Failed to spawn journalctl: No such file or directory"
        );
    }

    #[test]
    fn store_errors_convert_into_stream_errors() {
        let err: StreamError = StoreError::Io("disk full".into()).into();
        assert!(matches!(err, StreamError::Store(StoreError::Io(_))));
    }
}
