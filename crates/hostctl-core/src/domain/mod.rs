//! Core domain types.
//!
//! These types represent the pure domain model, independent of any
//! process or filesystem concerns.
//!
//! # Structure
//!
//! - `log` - Log records and severities (`LogRecord`, `Severity`, `ParsedLine`)
//! - `session` - Streaming session identity (`LogTarget`, `SessionId`, `SessionInfo`)
//! - `job` - Background job records and specs (`BackgroundJob`, `JobSpec`)

pub mod job;
pub mod log;
pub mod session;

pub use job::{BackgroundJob, JobPoll, JobSpec, JobStatus, ProbeSpec};
pub use log::{LogRecord, ParsedLine, Severity, TRUNCATED_MARKER, now_millis};
pub use session::{LogTarget, SessionId, SessionInfo, SessionKind, SessionState};
