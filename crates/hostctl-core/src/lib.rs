//! Core domain types and ports for hostctl.
//!
//! This crate has no process or I/O code of its own. It defines the records
//! that flow through log streams and job tracking, the error taxonomy, and
//! the traits the runtime and adapters implement.

pub mod domain;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    BackgroundJob, JobPoll, JobSpec, JobStatus, LogRecord, LogTarget, ParsedLine, ProbeSpec,
    SessionId, SessionInfo, SessionKind, SessionState, Severity, TRUNCATED_MARKER, now_millis,
};
pub use paths::{PathError, data_root, ensure_directory, jobs_dir, logs_dir};
pub use ports::{
    CommandOutput, CommandRunner, CoreError, KeyValueStore, StaticTokenVerifier, StoreError,
    StreamError, TokenVerifier,
};
pub use settings::{Settings, SettingsError, validate_settings};
