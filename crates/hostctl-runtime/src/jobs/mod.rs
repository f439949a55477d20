//! Detached background jobs.
//!
//! - `store` - file-backed `KeyValueStore` holding job records
//! - `tracker` - start, poll, cancel and reap jobs

mod store;
mod tracker;

use std::path::{Path, PathBuf};

pub use store::FsKeyValueStore;
pub use tracker::JobTracker;

/// File the worker of job `id` writes its output to.
pub fn artifact_path(jobs_dir: &Path, id: &str) -> PathBuf {
    jobs_dir.join(format!("{id}.log"))
}
