//! `CommandRunner` backed by `tokio::process`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use hostctl_core::{CommandOutput, CommandRunner, StreamError};
use tokio::process::Command;
use tracing::debug;

/// Upper bound for one-shot commands. Probes are meant to be cheap.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs commands to completion with a timeout, capturing stdout and stderr.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, command: &str, args: &[String]) -> Result<CommandOutput, StreamError> {
        let child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StreamError::spawn(command, e))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                StreamError::Io(format!(
                    "{command} did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        debug!(command, status = ?output.status.code(), "Command finished");
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let runner = TokioCommandRunner::default();
        let out = runner
            .run("sh", &["-c".into(), "printf 'a\\nb\\n'; echo oops >&2; exit 2".into()])
            .await
            .unwrap();
        assert_eq!(out.count_lines(), 2);
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, Some(2));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let runner = TokioCommandRunner::default();
        let err = runner.run("definitely-not-a-real-binary-hostctl", &[]).await.unwrap_err();
        assert!(matches!(err, StreamError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_commands_time_out() {
        let runner = TokioCommandRunner::new(Duration::from_millis(100));
        let err = runner.run("sleep", &["5".into()]).await.unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
    }
}
