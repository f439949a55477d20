//! Background job domain types.
//!
//! A background job is a detached worker process (archive extraction,
//! archive creation) whose state lives in durable storage so it survives a
//! restart of the control process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::ports::StreamError;

/// Status of a background job. Every state except `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Running,
    Done,
    Cancelled,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Durable record of one background job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundJob {
    pub id: String,
    /// Short label such as `unzip` or `zip`
    pub kind: String,
    /// OS process id of the detached worker
    pub pid: u32,
    pub total_units: u64,
    pub completed_units: u64,
    pub status: JobStatus,
    /// File the worker writes its progress output to
    pub artifact: PathBuf,
    /// Prefixes that mark one completed unit in the artifact
    pub markers: Vec<String>,
    /// Unix timestamp in milliseconds
    pub created_at: u64,
    /// Unix timestamp in milliseconds
    pub updated_at: u64,
}

impl BackgroundJob {
    /// Create a freshly started job. `total_units` is floored at 1.
    pub fn started(
        id: impl Into<String>,
        kind: impl Into<String>,
        pid: u32,
        total_units: u64,
        artifact: PathBuf,
        markers: Vec<String>,
        now: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            pid,
            total_units: total_units.max(1),
            completed_units: 0,
            status: JobStatus::Running,
            artifact,
            markers,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a freshly scanned unit count into the job.
    ///
    /// Progress never decreases and never exceeds `total_units`. Returns
    /// whether the stored value changed.
    pub fn observe_progress(&mut self, scanned: u64) -> bool {
        let next = self.completed_units.max(scanned).min(self.total_units);
        let changed = next != self.completed_units;
        self.completed_units = next;
        changed
    }

    /// Compare-and-set transition out of `Running`.
    ///
    /// Returns `false` without touching the job if it is already terminal.
    pub fn finish(&mut self, status: JobStatus, now: u64) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        true
    }

    /// Progress as a whole percentage.
    #[must_use]
    pub fn percent(&self) -> u8 {
        let total = self.total_units.max(1);
        let pct = self.completed_units.min(total) * 100 / total;
        u8::try_from(pct).unwrap_or(100)
    }
}

/// Result of looking a job up by id.
///
/// `NotFound` is distinct from every job status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPoll {
    Found(BackgroundJob),
    NotFound,
}

impl JobPoll {
    #[must_use]
    pub fn into_job(self) -> Option<BackgroundJob> {
        match self {
            Self::Found(job) => Some(job),
            Self::NotFound => None,
        }
    }
}

/// Cheap upfront command whose non-empty stdout lines count the job's units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub command: String,
    pub args: Vec<String>,
}

/// Everything needed to start a background job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub kind: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub probe: Option<ProbeSpec>,
    pub markers: Vec<String>,
}

impl JobSpec {
    /// Extract `archive` into `destination` (defaults to the archive's directory).
    pub fn unzip(archive: &Path, destination: Option<&Path>) -> Result<Self, StreamError> {
        let destination = match destination {
            Some(dest) => dest.to_path_buf(),
            None => archive
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StreamError::InvalidTarget("archive has no parent directory".into()))?,
        };
        let archive = path_arg(archive)?;
        Ok(Self {
            kind: "unzip".into(),
            command: "unzip".into(),
            args: vec![
                "-o".into(),
                archive.clone(),
                "-d".into(),
                path_arg(&destination)?,
            ],
            cwd: None,
            probe: Some(ProbeSpec {
                command: "unzip".into(),
                args: vec!["-Z1".into(), archive],
            }),
            markers: vec!["inflating:".into(), "extracting:".into(), "creating:".into()],
        })
    }

    /// Create `destination` from `paths`, stored relative to their common parent.
    pub fn zip(paths: &[PathBuf], destination: &Path) -> Result<Self, StreamError> {
        let first = paths
            .first()
            .ok_or_else(|| StreamError::InvalidTarget("zip requires at least one path".into()))?;
        let parent = first
            .parent()
            .ok_or_else(|| StreamError::InvalidTarget("path has no parent directory".into()))?
            .to_path_buf();

        let mut names = Vec::with_capacity(paths.len());
        let mut probe_args = vec!["-P".to_string()];
        for path in paths {
            if path.parent() != Some(parent.as_path()) {
                return Err(StreamError::InvalidTarget(format!(
                    "all paths must share the directory {}",
                    parent.display()
                )));
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| StreamError::InvalidTarget(format!("invalid path {}", path.display())))?;
            names.push(format!("./{name}"));
            probe_args.push(path_arg(path)?);
        }

        let mut args = vec!["-r".into(), path_arg(destination)?];
        args.extend(names);

        Ok(Self {
            kind: "zip".into(),
            command: "zip".into(),
            args,
            cwd: Some(parent),
            probe: Some(ProbeSpec {
                command: "find".into(),
                args: probe_args,
            }),
            markers: vec!["adding:".into()],
        })
    }
}

fn path_arg(path: &Path) -> Result<String, StreamError> {
    if !path.is_absolute() {
        return Err(StreamError::InvalidTarget(format!(
            "path must be absolute: {}",
            path.display()
        )));
    }
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| StreamError::InvalidTarget(format!("path is not UTF-8: {}", path.display())))
}
