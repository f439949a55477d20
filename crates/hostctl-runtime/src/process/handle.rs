//! Owned OS process with bounded, streamed output.
//!
//! A `ProcessHandle` owns exactly one child process. Its output arrives as
//! byte chunks on a bounded channel; when the channel is full the reader
//! stops pulling from the pipe, so buffered output never exceeds the ceiling
//! given at spawn time and the child eventually blocks on write.
//!
//! The lifecycle is published on a `watch` channel. The first transition into
//! a terminal state wins and later ones are ignored, so `wait()` and
//! `state()` agree no matter how many observers there are.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use hostctl_core::StreamError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::pty::PtyControl;
use super::signal::{ProcessSignal, send_signal};

/// Largest single output chunk.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Pending stdin writes before `write` starts waiting.
pub(super) const STDIN_QUEUE: usize = 64;

/// What to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment on top of the inherited one
    pub env: Vec<(String, String)>,
}

impl SpawnSpec {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Command line for logs and session listings.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// How the child's stdio is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Separate stdin/stdout/stderr pipes.
    Pipes,
    /// A pseudo-terminal; stdout and stderr are merged.
    Pty { cols: u16, rows: u16 },
}

/// Lifecycle of a process handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    /// Exit code, or `128 + signal` when a signal we did not send ended it
    Exited(i32),
    Killed,
    Failed(String),
}

impl ProcessState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::Killed | Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A slice of raw process output, at most [`CHUNK_SIZE`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub data: Bytes,
}

/// Receiving side of a process's output. Ends once every reader hit EOF.
#[derive(Debug)]
pub struct ProcessOutput {
    rx: mpsc::Receiver<OutputChunk>,
}

impl ProcessOutput {
    pub(super) const fn new(rx: mpsc::Receiver<OutputChunk>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<OutputChunk> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> ReceiverStream<OutputChunk> {
        ReceiverStream::new(self.rx)
    }
}

/// Move `state` into `next` unless it is already terminal.
///
/// Returns whether this call performed the transition.
pub(super) fn settle(state: &watch::Sender<ProcessState>, next: ProcessState) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() {
            return false;
        }
        *current = next;
        true
    })
}

pub(super) enum Control {
    /// Signals are forwarded to the supervisor task that owns the `Child`,
    /// which stops signalling once the child is reaped.
    Pipes {
        signals: mpsc::UnboundedSender<ProcessSignal>,
    },
    Pty(PtyControl),
}

/// A running (or finished) child process.
pub struct ProcessHandle {
    pid: Option<u32>,
    command: String,
    args: Vec<String>,
    state: Arc<watch::Sender<ProcessState>>,
    stdin: mpsc::Sender<Bytes>,
    control: Control,
    output: StdMutex<Option<ProcessOutput>>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Start a process.
    ///
    /// `output_ceiling` bounds the bytes buffered between the child and the
    /// consumer of [`ProcessHandle::take_output`]. Must be called from
    /// within a tokio runtime.
    pub fn spawn(spec: SpawnSpec, mode: IoMode, output_ceiling: usize) -> Result<Self, StreamError> {
        let capacity = (output_ceiling / CHUNK_SIZE).max(1);
        match mode {
            IoMode::Pipes => Self::spawn_pipes(spec, capacity),
            IoMode::Pty { cols, rows } => super::pty::spawn(spec, cols, rows, capacity),
        }
    }

    pub(super) fn from_parts(
        pid: Option<u32>,
        spec: SpawnSpec,
        state: Arc<watch::Sender<ProcessState>>,
        stdin: mpsc::Sender<Bytes>,
        control: Control,
        output: ProcessOutput,
    ) -> Self {
        Self {
            pid,
            command: spec.command,
            args: spec.args,
            state,
            stdin,
            control,
            output: StdMutex::new(Some(output)),
        }
    }

    fn spawn_pipes(spec: SpawnSpec, capacity: usize) -> Result<Self, StreamError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| StreamError::spawn(&spec.command, e))?;
        let pid = child.id();
        debug!(pid = ?pid, command = %spec.display(), "Spawned piped process");

        let (out_tx, out_rx) = mpsc::channel(capacity);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, OutputStream::Stdout, out_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, OutputStream::Stderr, out_tx.clone());
        }
        drop(out_tx);

        let (stdin_tx, stdin_rx) = mpsc::channel(STDIN_QUEUE);
        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(pump_stdin(stdin, stdin_rx));
        }

        let state = Arc::new(watch::channel(ProcessState::Starting).0);
        state.send_replace(ProcessState::Running);

        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        tokio::spawn(supervise(child, Arc::clone(&state), sig_rx));

        Ok(Self::from_parts(
            pid,
            spec,
            state,
            stdin_tx,
            Control::Pipes { signals: sig_tx },
            ProcessOutput::new(out_rx),
        ))
    }

    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn state(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    /// Watch lifecycle changes. The current state is observable immediately.
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    /// Take the output receiver. Only the first call returns `Some`.
    pub fn take_output(&self) -> Option<ProcessOutput> {
        self.output.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Queue bytes for the child's stdin (or the PTY input).
    pub async fn write(&self, bytes: impl Into<Bytes>) -> Result<(), StreamError> {
        if self.is_terminal() {
            return Err(StreamError::Closed(format!("{} is no longer running", self.command)));
        }
        self.stdin
            .send(bytes.into())
            .await
            .map_err(|_| StreamError::Closed(format!("stdin of {} is closed", self.command)))
    }

    /// Change the terminal size. A no-op for piped processes.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), StreamError> {
        if self.is_terminal() {
            return Err(StreamError::Closed(format!("{} is no longer running", self.command)));
        }
        match &self.control {
            Control::Pipes { .. } => Ok(()),
            Control::Pty(pty) => pty.resize(cols, rows),
        }
    }

    /// Mark the process `Killed` and deliver `sig`.
    ///
    /// Does nothing if the process already reached a terminal state, so
    /// repeated calls are harmless.
    pub fn kill(&self, sig: ProcessSignal) {
        if !settle(&self.state, ProcessState::Killed) {
            return;
        }
        debug!(pid = ?self.pid, command = %self.command, signal = ?sig, "Killing process");
        match &self.control {
            Control::Pipes { signals } => {
                // Supervisor already gone means the child was reaped.
                let _ = signals.send(sig);
            }
            Control::Pty(pty) => pty.signal(sig),
        }
    }

    /// Resolve once the process is in a terminal state.
    ///
    /// Returns immediately if that already happened.
    pub async fn wait(&self) -> ProcessState {
        let mut rx = self.state.subscribe();
        let result = rx
            .wait_for(ProcessState::is_terminal)
            .await
            .map(|state| (*state).clone());
        result.unwrap_or_else(|_| self.state())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill(ProcessSignal::SIGKILL);
    }
}

/// Exit code as reported to observers.
pub(super) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Own the child until it is reaped, relaying signals while it lives.
async fn supervise(
    mut child: Child,
    state: Arc<watch::Sender<ProcessState>>,
    mut signals: mpsc::UnboundedReceiver<ProcessSignal>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(sig) = signals.recv() => {
                if let Some(pid) = child.id() {
                    if let Err(e) = send_signal(pid, sig) {
                        warn!(pid, error = %e, "Failed to signal process");
                    }
                }
            }
        }
    };

    let next = match status {
        Ok(status) => ProcessState::Exited(exit_code(status)),
        Err(e) => ProcessState::Failed(e.to_string()),
    };
    debug!(state = ?next, "Process reaped");
    settle(&state, next);
}

/// Copy one pipe into the output channel until EOF, error, or the consumer
/// going away. The pipe is closed when this returns.
fn spawn_reader(
    mut pipe: impl AsyncRead + Unpin + Send + 'static,
    stream: OutputStream,
    tx: mpsc::Sender<OutputChunk>,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = OutputChunk {
                        stream,
                        data: Bytes::copy_from_slice(&buf[..n]),
                    };
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!(?stream, error = %e, "Output reader exiting due to read error");
                    break;
                }
            }
        }
        debug!(?stream, "Output reader task exiting");
    });
}

async fn pump_stdin(mut stdin: ChildStdin, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = stdin.write_all(&bytes).await {
            debug!(error = %e, "stdin writer exiting");
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn collect(output: &mut ProcessOutput) -> Vec<u8> {
        let mut all = Vec::new();
        while let Some(chunk) = output.recv().await {
            all.extend_from_slice(&chunk.data);
        }
        all
    }

    #[tokio::test]
    async fn output_can_only_be_taken_once() {
        let handle = ProcessHandle::spawn(SpawnSpec::new("true", Vec::<String>::new()), IoMode::Pipes, 64 * 1024).unwrap();
        assert!(handle.take_output().is_some());
        assert!(handle.take_output().is_none());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = ProcessHandle::spawn(
            SpawnSpec::new("/nonexistent/hostctl-test-binary", Vec::<String>::new()),
            IoMode::Pipes,
            64 * 1024,
        )
        .unwrap_err();
        assert!(matches!(err, StreamError::Spawn { .. }));
    }

    #[tokio::test]
    async fn echoes_stdin_and_reports_exit_code() {
        let handle = ProcessHandle::spawn(
            SpawnSpec::new("sh", ["-c", "read line; echo \"got $line\"; exit 3"]),
            IoMode::Pipes,
            64 * 1024,
        )
        .unwrap();
        let mut output = handle.take_output().unwrap();
        handle.write(&b"ping\n"[..]).await.unwrap();

        let bytes = timeout(Duration::from_secs(5), collect(&mut output)).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&bytes), "got ping\n");
        assert_eq!(handle.wait().await, ProcessState::Exited(3));
    }

    #[tokio::test]
    async fn stderr_is_tagged() {
        let handle = ProcessHandle::spawn(
            SpawnSpec::new("sh", ["-c", "echo oops >&2"]),
            IoMode::Pipes,
            64 * 1024,
        )
        .unwrap();
        let mut output = handle.take_output().unwrap();
        let chunk = timeout(Duration::from_secs(5), output.recv()).await.unwrap().unwrap();
        assert_eq!(chunk.stream, OutputStream::Stderr);
    }

    #[tokio::test]
    async fn kill_is_idempotent_and_sticky() {
        let handle = ProcessHandle::spawn(SpawnSpec::new("sleep", ["30"]), IoMode::Pipes, 64 * 1024).unwrap();
        let pid = handle.pid().unwrap();

        handle.kill(ProcessSignal::SIGKILL);
        handle.kill(ProcessSignal::SIGKILL);
        assert_eq!(handle.wait().await, ProcessState::Killed);

        // Late observers see the same terminal state
        assert_eq!(handle.wait().await, ProcessState::Killed);
        assert!(handle.write(&b"x"[..]).await.is_err());
        assert!(matches!(handle.resize(10, 10), Err(StreamError::Closed(_))));

        let gone = async {
            while crate::process::pid_exists(pid) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        timeout(Duration::from_secs(5), gone).await.unwrap();
    }

    #[tokio::test]
    async fn kill_after_exit_keeps_exit_state() {
        let handle = ProcessHandle::spawn(SpawnSpec::new("true", Vec::<String>::new()), IoMode::Pipes, 64 * 1024).unwrap();
        assert_eq!(handle.wait().await, ProcessState::Exited(0));
        handle.kill(ProcessSignal::SIGKILL);
        assert_eq!(handle.state(), ProcessState::Exited(0));
    }

    #[tokio::test]
    async fn resize_is_noop_for_pipes() {
        let handle = ProcessHandle::spawn(SpawnSpec::new("sleep", ["5"]), IoMode::Pipes, 64 * 1024).unwrap();
        assert!(handle.resize(120, 40).is_ok());
    }

    #[tokio::test]
    async fn full_output_buffer_blocks_the_producer() {
        // One chunk of capacity; the child writes far more than that
        let handle = ProcessHandle::spawn(
            SpawnSpec::new("sh", ["-c", "yes | head -c 1048576; echo done >&2"]),
            IoMode::Pipes,
            CHUNK_SIZE,
        )
        .unwrap();
        let mut output = handle.take_output().unwrap();

        // Nobody reads: the child cannot finish
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(handle.state(), ProcessState::Running);

        // Draining lets it run to completion without losing bytes
        let bytes = timeout(Duration::from_secs(10), collect(&mut output)).await.unwrap();
        assert!(bytes.len() >= 1_048_576);
        assert!(matches!(handle.wait().await, ProcessState::Exited(_)));
    }

    #[test]
    fn spec_display_joins_args() {
        let spec = SpawnSpec::new("tail", ["-F", "/var/log/x"]);
        assert_eq!(spec.display(), "tail -F /var/log/x");
    }
}
