//! One-shot command execution port.
//!
//! Used for cheap upfront probes (counting archive entries, listing files).
//! Long-lived processes never go through this port.

use async_trait::async_trait;

use super::StreamError;

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Number of non-empty stdout lines.
    #[must_use]
    pub fn count_lines(&self) -> u64 {
        self.stdout.lines().filter(|l| !l.trim().is_empty()).count() as u64
    }
}

/// Runs a command to completion and captures its output.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` with `args`.
    ///
    /// A non-zero exit is not an error; inspect `exit_code`. An error means
    /// the command could not be started at all.
    async fn run(&self, command: &str, args: &[String]) -> Result<CommandOutput, StreamError>;
}
