//! Settings domain types and validation.
//!
//! Every field is optional so a settings file only needs to mention what it
//! changes; the `effective_*` accessors supply defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time a log session stays alive after its last subscriber leaves.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 10_000;

/// Default per-subscriber queue depth, in records.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 1024;

/// Default number of recent records replayed to a late subscriber.
pub const DEFAULT_HISTORY_LINES: usize = 200;

/// Default longest line kept before truncation, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Default ceiling of buffered-but-unread process output, in bytes.
pub const DEFAULT_OUTPUT_BUFFER_BYTES: usize = 1024 * 1024;

/// Default number of lines a tailer asks for before following.
pub const DEFAULT_INITIAL_LINES: u32 = 100;

pub const DEFAULT_TERMINAL_COLS: u16 = 80;
pub const DEFAULT_TERMINAL_ROWS: u16 = 30;

/// Application settings structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Grace period before an unsubscribed log session is torn down.
    pub grace_period_ms: Option<u64>,

    /// Queue depth per subscriber before it is treated as a slow consumer.
    pub subscriber_queue: Option<usize>,

    /// Recent records kept per channel for late subscribers.
    pub history_lines: Option<usize>,

    /// Longest accepted log line in bytes.
    pub max_line_bytes: Option<usize>,

    /// Output ceiling per process in bytes.
    pub output_buffer_bytes: Option<usize>,

    /// Lines of backlog requested from `tail`/`journalctl`.
    pub initial_lines: Option<u32>,

    /// Shell for terminal sessions. Falls back to `$SHELL`, then `bash`.
    pub terminal_shell: Option<String>,

    pub terminal_cols: Option<u16>,
    pub terminal_rows: Option<u16>,
}

impl Settings {
    /// Create settings with every default filled in.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            grace_period_ms: Some(DEFAULT_GRACE_PERIOD_MS),
            subscriber_queue: Some(DEFAULT_SUBSCRIBER_QUEUE),
            history_lines: Some(DEFAULT_HISTORY_LINES),
            max_line_bytes: Some(DEFAULT_MAX_LINE_BYTES),
            output_buffer_bytes: Some(DEFAULT_OUTPUT_BUFFER_BYTES),
            initial_lines: Some(DEFAULT_INITIAL_LINES),
            terminal_shell: None,
            terminal_cols: Some(DEFAULT_TERMINAL_COLS),
            terminal_rows: Some(DEFAULT_TERMINAL_ROWS),
        }
    }

    #[must_use]
    pub fn effective_grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms.unwrap_or(DEFAULT_GRACE_PERIOD_MS))
    }

    #[must_use]
    pub fn effective_subscriber_queue(&self) -> usize {
        self.subscriber_queue.unwrap_or(DEFAULT_SUBSCRIBER_QUEUE)
    }

    #[must_use]
    pub fn effective_history_lines(&self) -> usize {
        self.history_lines.unwrap_or(DEFAULT_HISTORY_LINES)
    }

    #[must_use]
    pub fn effective_max_line_bytes(&self) -> usize {
        self.max_line_bytes.unwrap_or(DEFAULT_MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn effective_output_buffer_bytes(&self) -> usize {
        self.output_buffer_bytes.unwrap_or(DEFAULT_OUTPUT_BUFFER_BYTES)
    }

    #[must_use]
    pub fn effective_initial_lines(&self) -> u32 {
        self.initial_lines.unwrap_or(DEFAULT_INITIAL_LINES)
    }

    /// Shell for new terminals: configured, then `$SHELL`, then `bash`.
    #[must_use]
    pub fn effective_terminal_shell(&self) -> String {
        self.terminal_shell
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "bash".to_string())
    }

    #[must_use]
    pub fn effective_terminal_size(&self) -> (u16, u16) {
        (
            self.terminal_cols.unwrap_or(DEFAULT_TERMINAL_COLS),
            self.terminal_rows.unwrap_or(DEFAULT_TERMINAL_ROWS),
        )
    }

    /// Overwrite fields with every value `other` sets.
    pub fn merge(&mut self, other: &Self) {
        if other.grace_period_ms.is_some() {
            self.grace_period_ms = other.grace_period_ms;
        }
        if other.subscriber_queue.is_some() {
            self.subscriber_queue = other.subscriber_queue;
        }
        if other.history_lines.is_some() {
            self.history_lines = other.history_lines;
        }
        if other.max_line_bytes.is_some() {
            self.max_line_bytes = other.max_line_bytes;
        }
        if other.output_buffer_bytes.is_some() {
            self.output_buffer_bytes = other.output_buffer_bytes;
        }
        if other.initial_lines.is_some() {
            self.initial_lines = other.initial_lines;
        }
        if other.terminal_shell.is_some() {
            self.terminal_shell.clone_from(&other.terminal_shell);
        }
        if other.terminal_cols.is_some() {
            self.terminal_cols = other.terminal_cols;
        }
        if other.terminal_rows.is_some() {
            self.terminal_rows = other.terminal_rows;
        }
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Subscriber queue must be between 1 and 1,000,000, got {0}")]
    InvalidSubscriberQueue(usize),

    #[error("Max line bytes must be between 256 and 16 MiB, got {0}")]
    InvalidMaxLineBytes(usize),

    #[error("Output buffer must be at least 8 KiB, got {0}")]
    InvalidOutputBuffer(usize),

    #[error("History lines must be at most 100,000, got {0}")]
    InvalidHistoryLines(usize),

    #[error("Terminal size must be non-zero, got {cols}x{rows}")]
    InvalidTerminalSize { cols: u16, rows: u16 },

    #[error("Terminal shell cannot be empty")]
    EmptyTerminalShell,
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if let Some(queue) = settings.subscriber_queue {
        if !(1..=1_000_000).contains(&queue) {
            return Err(SettingsError::InvalidSubscriberQueue(queue));
        }
    }

    if let Some(max) = settings.max_line_bytes {
        if !(256..=16 * 1024 * 1024).contains(&max) {
            return Err(SettingsError::InvalidMaxLineBytes(max));
        }
    }

    if let Some(ceiling) = settings.output_buffer_bytes {
        if ceiling < 8 * 1024 {
            return Err(SettingsError::InvalidOutputBuffer(ceiling));
        }
    }

    if let Some(history) = settings.history_lines {
        if history > 100_000 {
            return Err(SettingsError::InvalidHistoryLines(history));
        }
    }

    let (cols, rows) = settings.effective_terminal_size();
    if cols == 0 || rows == 0 {
        return Err(SettingsError::InvalidTerminalSize { cols, rows });
    }

    if settings
        .terminal_shell
        .as_ref()
        .is_some_and(|s| s.trim().is_empty())
    {
        return Err(SettingsError::EmptyTerminalShell);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::with_defaults();
        assert_eq!(settings.effective_grace_period(), Duration::from_secs(10));
        assert_eq!(settings.effective_initial_lines(), 100);
        assert_eq!(settings.effective_terminal_size(), (80, 30));
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_empty_settings_fall_back_to_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.effective_subscriber_queue(), DEFAULT_SUBSCRIBER_QUEUE);
        assert_eq!(settings.effective_max_line_bytes(), DEFAULT_MAX_LINE_BYTES);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_partial_json_deserializes() {
        let settings: Settings = serde_json::from_str(r#"{"grace_period_ms": 250}"#).unwrap();
        assert_eq!(settings.effective_grace_period(), Duration::from_millis(250));
        assert_eq!(settings.history_lines, None);
    }

    #[test]
    fn test_merge_only_overwrites_set_fields() {
        let mut base = Settings::with_defaults();
        let overlay = Settings {
            history_lines: Some(5),
            ..Settings::default()
        };
        base.merge(&overlay);
        assert_eq!(base.history_lines, Some(5));
        assert_eq!(base.grace_period_ms, Some(DEFAULT_GRACE_PERIOD_MS));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_queue = Settings {
            subscriber_queue: Some(0),
            ..Settings::default()
        };
        assert!(matches!(
            validate_settings(&zero_queue),
            Err(SettingsError::InvalidSubscriberQueue(0))
        ));

        let tiny_buffer = Settings {
            output_buffer_bytes: Some(100),
            ..Settings::default()
        };
        assert!(validate_settings(&tiny_buffer).is_err());

        let no_rows = Settings {
            terminal_rows: Some(0),
            ..Settings::default()
        };
        assert!(validate_settings(&no_rows).is_err());

        let blank_shell = Settings {
            terminal_shell: Some("  ".into()),
            ..Settings::default()
        };
        assert!(matches!(
            validate_settings(&blank_shell),
            Err(SettingsError::EmptyTerminalShell)
        ));
    }
}
