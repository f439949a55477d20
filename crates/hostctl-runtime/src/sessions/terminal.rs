//! Interactive shell sessions.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use hostctl_core::{SessionId, StreamError};
use serde::Deserialize;

use super::registry::RegistryInner;
use crate::process::{ProcessHandle, ProcessOutput, ProcessSignal, ProcessState};

/// Overrides for a new terminal. Unset fields use the registry defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TerminalOptions {
    pub cols: Option<u16>,
    pub rows: Option<u16>,
    pub shell: Option<String>,
    pub cwd: Option<PathBuf>,
}

impl TerminalOptions {
    pub const fn with_size(cols: u16, rows: u16) -> Self {
        Self {
            cols: Some(cols),
            rows: Some(rows),
            shell: None,
            cwd: None,
        }
    }
}

/// One client's shell. Never shared.
///
/// Closing or dropping the session kills the shell immediately.
pub struct TerminalSession {
    id: SessionId,
    handle: Arc<ProcessHandle>,
    registry: Weak<RegistryInner>,
    closed: AtomicBool,
}

impl TerminalSession {
    pub(super) const fn new(
        id: SessionId,
        handle: Arc<ProcessHandle>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        Self {
            id,
            handle,
            registry,
            closed: AtomicBool::new(false),
        }
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }

    /// Raw terminal output. Only the first call returns `Some`.
    pub fn output(&self) -> Option<ProcessOutput> {
        self.handle.take_output()
    }

    /// Send keystrokes to the shell.
    pub async fn write(&self, bytes: impl Into<Bytes>) -> Result<(), StreamError> {
        self.handle.write(bytes).await
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), StreamError> {
        self.handle.resize(cols.max(1), rows.max(1))
    }

    pub fn state(&self) -> ProcessState {
        self.handle.state()
    }

    /// Resolve when the shell has exited or was killed.
    pub async fn wait(&self) -> ProcessState {
        self.handle.wait().await
    }

    /// Kill the shell and deregister the session. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.handle.kill(ProcessSignal::SIGKILL);
        if let Some(inner) = self.registry.upgrade() {
            inner.remove_terminal(&self.id);
        }
    }
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("pid", &self.handle.pid())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.close();
    }
}
