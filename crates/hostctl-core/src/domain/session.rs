//! Streaming session identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ports::StreamError;

/// Longest service or job name accepted as a log target.
const MAX_TARGET_LEN: usize = 128;

/// What kind of resource a session streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    LogStream,
    Terminal,
    BackgroundJob,
}

impl SessionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LogStream => "logs",
            Self::Terminal => "terminal",
            Self::BackgroundJob => "job",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque session identifier, unique for the lifetime of the control process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Build an id from a kind and a monotonic sequence number.
    #[must_use]
    pub fn new(kind: SessionKind, seq: u64) -> Self {
        Self(format!("{kind}-{seq}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical identity of a shareable log stream.
///
/// Two requests for the same target share one underlying process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "camelCase")]
pub enum LogTarget {
    /// A service's logs (journal unit or a known log file).
    Service(String),
    /// The output artifact of a background job.
    Job(String),
    /// PM2-managed process logs: a process id or name, or `all`.
    Pm2(String),
}

impl LogTarget {
    /// Validated service target.
    pub fn service(name: impl Into<String>) -> Result<Self, StreamError> {
        let name = name.into();
        validate_target_name(&name, true)?;
        Ok(Self::Service(name))
    }

    /// Validated job target.
    pub fn job(id: impl Into<String>) -> Result<Self, StreamError> {
        let id = id.into();
        validate_target_name(&id, false)?;
        Ok(Self::Job(id))
    }

    /// Validated PM2 target (`all`, a pm id or an app name).
    pub fn pm2(process: impl Into<String>) -> Result<Self, StreamError> {
        let process = process.into();
        validate_target_name(&process, false)?;
        Ok(Self::Pm2(process))
    }

    /// Whether this target covers every PM2 process.
    #[must_use]
    pub fn is_all_pm2(&self) -> bool {
        matches!(self, Self::Pm2(p) if p == "all")
    }

    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        match self {
            Self::Service(_) | Self::Pm2(_) => SessionKind::LogStream,
            Self::Job(_) => SessionKind::BackgroundJob,
        }
    }

    /// Name used as the fallback `source` of raw records.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Service(name) | Self::Job(name) | Self::Pm2(name) => name,
        }
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(name) => write!(f, "service:{name}"),
            Self::Job(id) => write!(f, "job:{id}"),
            Self::Pm2(process) => write!(f, "pm2:{process}"),
        }
    }
}

/// Reject names that could smuggle flags or paths into a spawned command.
fn validate_target_name(name: &str, allow_glob: bool) -> Result<(), StreamError> {
    if name.is_empty() {
        return Err(StreamError::InvalidTarget("target name must not be empty".into()));
    }
    if name.len() > MAX_TARGET_LEN {
        return Err(StreamError::InvalidTarget(format!(
            "target name too long ({} chars, max {MAX_TARGET_LEN})",
            name.len()
        )));
    }
    if name.starts_with('-') {
        return Err(StreamError::InvalidTarget(format!(
            "target name must not start with '-': {name}"
        )));
    }
    let valid = name.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || matches!(c, '@' | '.' | '_' | ':' | '-')
            || (allow_glob && c == '*')
    });
    if !valid || name.contains("..") {
        return Err(StreamError::InvalidTarget(format!(
            "target name contains invalid characters: {name}"
        )));
    }
    Ok(())
}

/// Lifecycle phase of a shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Active,
    Draining,
}

/// Point-in-time view of one registered session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub kind: SessionKind,
    /// Service name, job id, or shell command for terminals
    pub target: String,
    pub pid: Option<u32>,
    pub subscribers: usize,
    pub state: SessionState,
    /// Unix timestamp in milliseconds
    pub created_at: u64,
}
