//! OS process ownership.
//!
//! - `handle` - `ProcessHandle` for piped and PTY children
//! - `pty` - pseudo-terminal plumbing
//! - `signal` - PID-level liveness probe and signal delivery

mod handle;
mod pty;
mod signal;

pub use handle::{
    CHUNK_SIZE, IoMode, OutputChunk, OutputStream, ProcessHandle, ProcessOutput, ProcessState,
    SpawnSpec,
};
pub use signal::{ProcessSignal, pid_exists, send_group_signal, send_signal};
