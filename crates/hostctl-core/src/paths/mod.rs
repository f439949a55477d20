//! Path utilities for hostctl data directories.
//!
//! Everything hostctl writes lives under a single data root:
//!
//! - `<root>/jobs` - background job records and their output artifacts
//! - `<root>/logs` - rolling diagnostic log files of the control process

mod error;
mod platform;

pub use error::PathError;
pub use platform::{
    DATA_DIR_ENV, data_root, ensure_directory, jobs_dir, logs_dir, resolve_data_root,
};
