//! Runtime for hostctl: owns OS processes and everything that streams
//! from them.
//!
//! - `process` - spawn, stream, signal and reap child processes
//! - `tailer` - turn process output into ordered log records
//! - `broadcast` - fan one stream out to many subscribers
//! - `sessions` - shared log sessions and private terminals
//! - `jobs` - detached background jobs and their durable records
//! - `command` - one-shot commands for the `CommandRunner` port

pub mod broadcast;
pub mod command;
pub mod jobs;
pub mod process;
pub mod sessions;
pub mod tailer;

pub use broadcast::{Broadcast, Subscription};
pub use command::TokioCommandRunner;
pub use jobs::{FsKeyValueStore, JobTracker, artifact_path};
pub use process::{IoMode, OutputChunk, OutputStream, ProcessHandle, ProcessOutput, ProcessState, SpawnSpec};
pub use sessions::{
    LogSourceLauncher, LogSubscription, SessionConfig, SessionRegistry, SystemLogLauncher,
    TerminalOptions, TerminalSession,
};
pub use tailer::LogTailer;
