//! Log record domain types.
//!
//! A `LogRecord` is the unit every log stream delivers, regardless of whether
//! the upstream source spoke systemd-journal JSON or plain text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Marker appended to a record whose source line exceeded the line cap.
pub const TRUNCATED_MARKER: &str = " …[truncated]";

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Syslog-style priority. Lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Severity(u8);

impl Severity {
    pub const EMERGENCY: Self = Self(0);
    pub const ALERT: Self = Self(1);
    pub const CRITICAL: Self = Self(2);
    pub const ERROR: Self = Self(3);
    pub const WARNING: Self = Self(4);
    pub const NOTICE: Self = Self(5);
    pub const INFO: Self = Self(6);
    pub const DEBUG: Self = Self(7);

    /// Build a severity from a raw priority, returning `None` outside 0–7.
    #[must_use]
    pub const fn from_priority(priority: u8) -> Option<Self> {
        if priority <= 7 { Some(Self(priority)) } else { None }
    }

    /// Parse a priority as journald renders it (`"6"`), falling back to info.
    #[must_use]
    pub fn parse_lossy(raw: &str) -> Self {
        raw.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::from_priority)
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn priority(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self.0 {
            0 => "emerg",
            1 => "alert",
            2 => "crit",
            3 => "err",
            4 => "warning",
            5 => "notice",
            6 => "info",
            _ => "debug",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::INFO
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single normalized log line.
///
/// Immutable once built; equality is plain value equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    /// The log line content
    pub message: String,
    /// Originating service or unit name
    pub source: String,
    /// Coarse priority
    pub severity: Severity,
}

impl LogRecord {
    pub fn new(
        timestamp: u64,
        message: impl Into<String>,
        source: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            timestamp,
            message: message.into(),
            source: source.into(),
            severity,
        }
    }

    /// Record stamped with the current time at info severity.
    pub fn info_now(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(now_millis(), message, source, Severity::INFO)
    }

    /// The single synthetic record emitted when a log source cannot start.
    pub fn source_failure(source: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::new(now_millis(), reason.to_string(), source, Severity::ERROR)
    }
}

/// Outcome of decoding one complete line.
///
/// Parsing is best-effort: a line that is not a journal entry is still a
/// record, just a `Raw` one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Structured(LogRecord),
    Raw(LogRecord),
}

impl ParsedLine {
    #[must_use]
    pub fn into_record(self) -> LogRecord {
        match self {
            Self::Structured(record) | Self::Raw(record) => record,
        }
    }

    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}
