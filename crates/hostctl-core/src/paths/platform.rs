//! Data root resolution.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::PathError;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "HOSTCTL_DATA_DIR";

/// Get the root directory for application data.
///
/// Resolution order:
/// 1. `HOSTCTL_DATA_DIR` environment variable
/// 2. System data directory (e.g., `~/.local/share/hostctl`)
///
/// The directory is created if it does not exist.
pub fn data_root() -> Result<PathBuf, PathError> {
    let root = resolve_data_root(env::var(DATA_DIR_ENV).ok().as_deref(), dirs::data_local_dir())?;
    ensure_directory(&root)?;
    Ok(root)
}

/// Pure resolution step of [`data_root`], without touching the filesystem.
pub fn resolve_data_root(
    override_dir: Option<&str>,
    system_dir: Option<PathBuf>,
) -> Result<PathBuf, PathError> {
    if let Some(path) = override_dir.map(str::trim).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    system_dir
        .map(|dir| dir.join("hostctl"))
        .ok_or(PathError::NoDataDir)
}

/// Directory for background job records and artifacts.
pub fn jobs_dir(root: &Path) -> PathBuf {
    root.join("jobs")
}

/// Directory for the control process's own log files.
pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}

/// Create `path` (and parents) unless it already exists as a directory.
pub fn ensure_directory(path: &Path) -> Result<(), PathError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PathError::NotADirectory(path.to_path_buf()));
        }
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
