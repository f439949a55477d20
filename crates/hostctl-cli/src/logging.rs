//! Tracing initialisation: compact stderr plus a daily rolling file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `verbose`. Console output goes to stderr, leaving
/// stdout to command output. When `logs_dir` cannot be created only the
/// console is used. The returned guard must live until exit so buffered
/// file output is flushed.
pub fn init_tracing(logs_dir: &Path, verbose: bool) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .compact();

    if let Err(e) = std::fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create log directory {}: {e}", logs_dir.display());
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .try_init()
            .ok();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(logs_dir, "hostctl");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact(),
        )
        .try_init()
        .ok();

    Some(guard)
}
