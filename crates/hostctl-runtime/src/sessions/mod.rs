//! Streaming sessions: shared log streams and private terminals.
//!
//! - `launcher` - which process serves a log target
//! - `registry` - session ownership, sharing and grace-period teardown
//! - `terminal` - per-client PTY shells

mod launcher;
mod registry;
mod terminal;

pub use launcher::{LaunchedSource, LogSourceLauncher, SourcePlan, SystemLogLauncher, plan_source};
pub use registry::{LogSubscription, SessionConfig, SessionRegistry};
pub use terminal::{TerminalOptions, TerminalSession};
