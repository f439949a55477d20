//! Pseudo-terminal backed processes.
//!
//! The PTY master is read on a blocking thread and written through a small
//! async task, so a stuck terminal never stalls the runtime.

use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use hostctl_core::StreamError;
use portable_pty::{CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::handle::{
    CHUNK_SIZE, Control, OutputChunk, OutputStream, ProcessHandle, ProcessOutput, ProcessState,
    STDIN_QUEUE, SpawnSpec, settle,
};
use super::signal::{ProcessSignal, send_signal};

/// Resize and signal access to a PTY child.
pub(crate) struct PtyControl {
    pid: Option<u32>,
    master: StdMutex<Box<dyn MasterPty + Send>>,
}

impl PtyControl {
    pub(crate) fn resize(&self, cols: u16, rows: u16) -> Result<(), StreamError> {
        let master = self
            .master
            .lock()
            .map_err(|_| StreamError::Io("pty master lock poisoned".into()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| StreamError::Io(format!("pty resize failed: {e}")))
    }

    pub(crate) fn signal(&self, sig: ProcessSignal) {
        let Some(pid) = self.pid else {
            return;
        };
        if let Err(e) = send_signal(pid, sig) {
            warn!(pid, error = %e, "Failed to signal terminal process");
        }
    }
}

pub(super) fn spawn(
    spec: SpawnSpec,
    cols: u16,
    rows: u16,
    capacity: usize,
) -> Result<ProcessHandle, StreamError> {
    let pair = native_pty_system()
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| StreamError::spawn(&spec.command, e))?;

    let mut builder = CommandBuilder::new(&spec.command);
    builder.args(&spec.args);
    if let Some(dir) = &spec.cwd {
        builder.cwd(dir);
    }
    for (key, value) in &spec.env {
        builder.env(key, value);
    }

    let mut child = pair
        .slave
        .spawn_command(builder)
        .map_err(|e| StreamError::spawn(&spec.command, e))?;
    // The master only sees EOF once no slave descriptor is left open here.
    drop(pair.slave);

    let pid = child.process_id();
    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| StreamError::spawn(&spec.command, e))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| StreamError::spawn(&spec.command, e))?;
    debug!(pid = ?pid, command = %spec.display(), cols, rows, "Spawned terminal process");

    let (out_tx, out_rx) = mpsc::channel(capacity);
    spawn_pty_reader(reader, out_tx);

    let (stdin_tx, stdin_rx) = mpsc::channel(STDIN_QUEUE);
    tokio::spawn(pump_pty_input(writer, stdin_rx));

    let state = Arc::new(watch::channel(ProcessState::Starting).0);
    state.send_replace(ProcessState::Running);

    let wait_state = Arc::clone(&state);
    tokio::task::spawn_blocking(move || {
        let next = match child.wait() {
            Ok(status) => ProcessState::Exited(i32::try_from(status.exit_code()).unwrap_or(-1)),
            Err(e) => ProcessState::Failed(e.to_string()),
        };
        debug!(state = ?next, "Terminal process reaped");
        settle(&wait_state, next);
    });

    Ok(ProcessHandle::from_parts(
        pid,
        spec,
        state,
        stdin_tx,
        Control::Pty(PtyControl {
            pid,
            master: StdMutex::new(pair.master),
        }),
        ProcessOutput::new(out_rx),
    ))
}

fn spawn_pty_reader(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<OutputChunk>) {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = OutputChunk {
                        stream: OutputStream::Stdout,
                        data: Bytes::copy_from_slice(&buf[..n]),
                    };
                    if tx.blocking_send(chunk).is_err() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                // Linux reports EIO once the last slave descriptor closes
                Err(_) => break,
            }
        }
        debug!("Terminal reader exiting");
    });
}

async fn pump_pty_input(writer: Box<dyn Write + Send>, mut rx: mpsc::Receiver<Bytes>) {
    let writer = Arc::new(StdMutex::new(writer));
    while let Some(bytes) = rx.recv().await {
        let writer = Arc::clone(&writer);
        let written = tokio::task::spawn_blocking(move || {
            let mut guard = writer
                .lock()
                .map_err(|_| std::io::Error::other("pty writer lock poisoned"))?;
            guard.write_all(&bytes)?;
            guard.flush()
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "Terminal writer exiting");
                break;
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::IoMode;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn read_until(output: &mut ProcessOutput, needle: &str) -> String {
        let mut seen = String::new();
        while let Some(chunk) = output.recv().await {
            seen.push_str(&String::from_utf8_lossy(&chunk.data));
            if seen.contains(needle) {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn shell_echoes_through_pty() {
        let handle = ProcessHandle::spawn(
            SpawnSpec::new("sh", Vec::<String>::new()).env("PS1", "$ "),
            IoMode::Pty { cols: 80, rows: 24 },
            64 * 1024,
        )
        .unwrap();
        let mut output = handle.take_output().unwrap();

        handle.write(&b"echo pty-$((40+2))\n"[..]).await.unwrap();
        let seen = timeout(Duration::from_secs(5), read_until(&mut output, "pty-42"))
            .await
            .unwrap();
        assert!(seen.contains("pty-42"));

        handle.resize(100, 40).unwrap();
        handle.kill(ProcessSignal::SIGKILL);
        assert_eq!(handle.wait().await, ProcessState::Killed);
    }

    #[tokio::test]
    async fn pty_exit_is_observed() {
        let handle = ProcessHandle::spawn(
            SpawnSpec::new("sh", ["-c", "exit 7"]),
            IoMode::Pty { cols: 80, rows: 24 },
            64 * 1024,
        )
        .unwrap();
        let state = timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        assert_eq!(state, ProcessState::Exited(7));
    }
}
