//! Shared-session registry.
//!
//! One log process per target, shared by every subscriber of that target.
//! The process outlives its last subscriber by a grace period so a page
//! reload reattaches instead of respawning; after that it is killed.
//! Terminal sessions are never shared.
//!
//! ```text
//! Absent --subscribe--> Active --last unsubscribe--> Draining
//!   ^                     ^  |                          |
//!   |                     |  +--source exits----------->+
//!   |                     +--------subscribe------------+
//!   +------------------grace expired / source exited----+
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use hostctl_core::{
    LogRecord, LogTarget, SessionId, SessionInfo, SessionKind, SessionState, Settings, StreamError,
    now_millis,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::launcher::LogSourceLauncher;
use super::terminal::{TerminalOptions, TerminalSession};
use crate::broadcast::{Broadcast, Subscription};
use crate::process::{IoMode, ProcessHandle, ProcessSignal, SpawnSpec};
use crate::tailer::LogTailer;

/// Tunables for the registry, usually derived from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub grace_period: Duration,
    pub subscriber_queue: usize,
    pub history_lines: usize,
    pub max_line_bytes: usize,
    pub output_buffer_bytes: usize,
    pub terminal_shell: String,
    pub terminal_cols: u16,
    pub terminal_rows: u16,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let (terminal_cols, terminal_rows) = settings.effective_terminal_size();
        Self {
            grace_period: settings.effective_grace_period(),
            subscriber_queue: settings.effective_subscriber_queue(),
            history_lines: settings.effective_history_lines(),
            max_line_bytes: settings.effective_max_line_bytes(),
            output_buffer_bytes: settings.effective_output_buffer_bytes(),
            terminal_shell: settings.effective_terminal_shell(),
            terminal_cols,
            terminal_rows,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::with_defaults())
    }
}

struct LogEntry {
    id: SessionId,
    handle: Arc<ProcessHandle>,
    channel: Broadcast<LogRecord>,
    subscribers: usize,
    state: SessionState,
    generation: u64,
    created_at: u64,
}

struct TerminalEntry {
    handle: Arc<ProcessHandle>,
    command: String,
    created_at: u64,
}

#[derive(Default)]
struct Sessions {
    logs: HashMap<LogTarget, LogEntry>,
    terminals: HashMap<SessionId, TerminalEntry>,
}

pub(super) struct RegistryInner {
    config: SessionConfig,
    launcher: Arc<dyn LogSourceLauncher>,
    /// Serializes first-subscribe per target. Entries live while held.
    spawn_locks: StdMutex<HashMap<LogTarget, Arc<Mutex<()>>>>,
    sessions: StdMutex<Sessions>,
    next_seq: AtomicU64,
}

impl RegistryInner {
    fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn spawn_lock(&self, target: &LogTarget) -> Arc<Mutex<()>> {
        let mut locks = self
            .spawn_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(target.clone()).or_default())
    }

    fn release_spawn_lock(&self, target: &LogTarget, lock: &Arc<Mutex<()>>) {
        let mut locks = self
            .spawn_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Only the map and `lock` itself hold it: nobody is waiting
        if Arc::strong_count(lock) == 2 {
            locks.remove(target);
        }
    }

    fn next_id(&self, kind: SessionKind) -> SessionId {
        SessionId::new(kind, self.next_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(super) fn remove_terminal(&self, id: &SessionId) {
        if self.sessions().terminals.remove(id).is_some() {
            info!(session = %id, "Terminal session closed");
        }
    }
}

/// Owner of every live streaming session.
///
/// Cheap to clone; clones share state. Dropping the last clone kills every
/// process the registry still owns.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, launcher: Arc<dyn LogSourceLauncher>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                launcher,
                spawn_locks: StdMutex::new(HashMap::new()),
                sessions: StdMutex::new(Sessions::default()),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Attach to the log stream for `target`, starting its source if needed.
    ///
    /// Concurrent first subscribers for the same target share one process.
    /// A subscriber joining a running session first receives the recent
    /// history. A source that cannot start yields `StreamError::Spawn` and
    /// leaves no session behind. A slow launch only delays subscribers of
    /// the same target.
    pub async fn subscribe_logs(&self, target: LogTarget) -> Result<LogSubscription, StreamError> {
        let lock = self.inner.spawn_lock(&target);
        let result = {
            let _spawn_guard = lock.lock().await;
            self.attach_or_launch(target.clone()).await
        };
        self.inner.release_spawn_lock(&target, &lock);
        result
    }

    async fn attach_or_launch(&self, target: LogTarget) -> Result<LogSubscription, StreamError> {
        if let Some(subscription) = self.attach_existing(&target) {
            return Ok(subscription);
        }

        let launched = self.inner.launcher.launch(&target).await?;
        let output = launched
            .handle
            .take_output()
            .ok_or_else(|| StreamError::Io(format!("output of {target} already taken")))?;
        let handle = Arc::new(launched.handle);
        let pid = handle.pid();

        let config = &self.inner.config;
        let channel = Broadcast::new(config.subscriber_queue, config.history_lines);
        for record in launched.preamble {
            channel.publish(record);
        }
        let subscription = channel.subscribe_with_history(config.history_lines);

        let id = self.inner.next_id(target.kind());
        self.inner.sessions().logs.insert(
            target.clone(),
            LogEntry {
                id: id.clone(),
                handle,
                channel: channel.clone(),
                subscribers: 1,
                state: SessionState::Active,
                generation: 0,
                created_at: now_millis(),
            },
        );
        info!(session = %id, %target, pid = ?pid, "Log session started");

        let tailer = LogTailer::new(target.name(), config.max_line_bytes, channel);
        let registry = Arc::downgrade(&self.inner);
        let exit_target = target.clone();
        let exit_id = id.clone();
        tokio::spawn(async move {
            tailer.run(output).await;
            if let Some(inner) = registry.upgrade() {
                source_exited(&inner, &exit_target, &exit_id);
            }
        });

        Ok(LogSubscription {
            inner: subscription,
            registry: Arc::downgrade(&self.inner),
            target,
            id,
            pid,
        })
    }

    fn attach_existing(&self, target: &LogTarget) -> Option<LogSubscription> {
        let mut sessions = self.inner.sessions();
        let entry = sessions.logs.get_mut(target)?;

        if entry.channel.is_closed() {
            // Source already ended; its exit hook has not run yet.
            debug!(session = %entry.id, %target, "Replacing finished log session");
            sessions.logs.remove(target);
            return None;
        }

        entry.subscribers += 1;
        if entry.state == SessionState::Draining {
            entry.state = SessionState::Active;
            entry.generation += 1;
            info!(session = %entry.id, %target, "Log session reattached");
        }
        let subscription = entry
            .channel
            .subscribe_with_history(self.inner.config.history_lines);
        Some(LogSubscription {
            inner: subscription,
            registry: Arc::downgrade(&self.inner),
            target: target.clone(),
            id: entry.id.clone(),
            pid: entry.handle.pid(),
        })
    }

    /// Start a new interactive shell on a pseudo-terminal.
    pub fn open_terminal(&self, options: TerminalOptions) -> Result<TerminalSession, StreamError> {
        let config = &self.inner.config;
        let shell = options
            .shell
            .unwrap_or_else(|| config.terminal_shell.clone());
        let cols = options.cols.unwrap_or(config.terminal_cols).max(1);
        let rows = options.rows.unwrap_or(config.terminal_rows).max(1);

        let mut spec = SpawnSpec::new(shell.clone(), Vec::<String>::new()).env("TERM", "xterm-color");
        if let Some(dir) = options.cwd.or_else(|| std::env::var_os("HOME").map(Into::into)) {
            spec = spec.cwd(dir);
        }

        let handle = Arc::new(ProcessHandle::spawn(
            spec,
            IoMode::Pty { cols, rows },
            config.output_buffer_bytes,
        )?);
        let id = self.inner.next_id(SessionKind::Terminal);
        self.inner.sessions().terminals.insert(
            id.clone(),
            TerminalEntry {
                handle: Arc::clone(&handle),
                command: shell,
                created_at: now_millis(),
            },
        );
        info!(session = %id, pid = ?handle.pid(), cols, rows, "Terminal session opened");

        Ok(TerminalSession::new(id, handle, Arc::downgrade(&self.inner)))
    }

    /// Snapshot of every registered session, oldest first.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.sessions();
        let mut list: Vec<SessionInfo> = sessions
            .logs
            .iter()
            .map(|(target, entry)| SessionInfo {
                id: entry.id.clone(),
                kind: target.kind(),
                target: target.name().to_string(),
                pid: entry.handle.pid(),
                subscribers: entry.subscribers,
                state: entry.state,
                created_at: entry.created_at,
            })
            .chain(sessions.terminals.iter().map(|(id, entry)| SessionInfo {
                id: id.clone(),
                kind: SessionKind::Terminal,
                target: entry.command.clone(),
                pid: entry.handle.pid(),
                subscribers: 1,
                state: SessionState::Active,
                created_at: entry.created_at,
            }))
            .collect();
        list.sort_by_key(|info| info.created_at);
        list
    }

    /// Kill every process and end every stream.
    pub fn shutdown(&self) {
        let (logs, terminals) = {
            let mut sessions = self.inner.sessions();
            (
                std::mem::take(&mut sessions.logs),
                std::mem::take(&mut sessions.terminals),
            )
        };
        let count = logs.len() + terminals.len();
        for entry in logs.into_values() {
            entry.handle.kill(ProcessSignal::SIGKILL);
            entry.channel.close();
        }
        for entry in terminals.into_values() {
            entry.handle.kill(ProcessSignal::SIGKILL);
        }
        info!(sessions = count, "Session registry shut down");
    }
}

/// The tailer hit end of output: drop the entry so the next subscribe respawns.
fn source_exited(inner: &RegistryInner, target: &LogTarget, id: &SessionId) {
    let mut sessions = inner.sessions();
    if sessions.logs.get(target).is_some_and(|e| &e.id == id) {
        if let Some(entry) = sessions.logs.remove(target) {
            info!(session = %id, %target, state = ?entry.handle.state(), "Log source exited");
        }
    }
}

/// Last subscriber left: arm the grace timer.
fn release(registry: &Weak<RegistryInner>, target: &LogTarget, id: &SessionId) {
    let Some(inner) = registry.upgrade() else {
        return;
    };
    let generation = {
        let mut sessions = inner.sessions();
        let Some(entry) = sessions.logs.get_mut(target).filter(|e| &e.id == id) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers > 0 || entry.state == SessionState::Draining {
            return;
        }
        entry.state = SessionState::Draining;
        entry.generation += 1;
        entry.generation
    };

    let grace = inner.config.grace_period;
    debug!(session = %id, %target, grace_ms = grace.as_millis(), "Log session draining");

    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        expire(&inner, target, id, generation);
        return;
    };
    let registry = Weak::clone(registry);
    let target = target.clone();
    let id = id.clone();
    runtime.spawn(async move {
        tokio::time::sleep(grace).await;
        if let Some(inner) = registry.upgrade() {
            expire(&inner, &target, &id, generation);
        }
    });
}

/// Grace period over: kill the source unless someone reattached meanwhile.
fn expire(inner: &RegistryInner, target: &LogTarget, id: &SessionId, generation: u64) {
    let removed = {
        let mut sessions = inner.sessions();
        let still_idle = sessions.logs.get(target).is_some_and(|e| {
            &e.id == id && e.generation == generation && e.subscribers == 0
        });
        if still_idle {
            sessions.logs.remove(target)
        } else {
            None
        }
    };
    if let Some(entry) = removed {
        entry.handle.kill(ProcessSignal::SIGKILL);
        entry.channel.close();
        info!(session = %id, %target, "Log session expired");
    }
}

/// A subscriber's view of a shared log stream.
///
/// Yields records in source order. A consumer that falls too far behind
/// gets one `StreamError::SlowConsumer` and the stream ends; the stream
/// also ends when the source process exits. Dropping it releases the
/// subscriber's share of the session.
pub struct LogSubscription {
    inner: Subscription<LogRecord>,
    registry: Weak<RegistryInner>,
    target: LogTarget,
    id: SessionId,
    pid: Option<u32>,
}

impl LogSubscription {
    pub const fn session_id(&self) -> &SessionId {
        &self.id
    }

    pub const fn target(&self) -> &LogTarget {
        &self.target
    }

    /// PID of the shared source process.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub async fn recv(&mut self) -> Option<Result<LogRecord, StreamError>> {
        self.inner.recv().await
    }
}

impl std::fmt::Debug for LogSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSubscription")
            .field("session", &self.id)
            .field("target", &self.target)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Stream for LogSubscription {
    type Item = Result<LogRecord, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.inner.unsubscribe();
        release(&self.registry, &self.target, &self.id);
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let sessions = self
            .sessions
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if sessions.logs.is_empty() && sessions.terminals.is_empty() {
            return;
        }
        warn!(
            logs = sessions.logs.len(),
            terminals = sessions.terminals.len(),
            "Registry dropped with live sessions; killing them"
        );
        for entry in sessions.logs.values() {
            entry.handle.kill(ProcessSignal::SIGKILL);
            entry.channel.close();
        }
        for entry in sessions.terminals.values() {
            entry.handle.kill(ProcessSignal::SIGKILL);
        }
    }
}
