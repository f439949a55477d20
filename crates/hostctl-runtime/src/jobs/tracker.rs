//! Background job lifecycle.
//!
//! Workers run detached in their own process group with output redirected
//! to an artifact file. Nothing but the record in the store and the
//! artifact on disk is needed to follow a job, so tracking survives a
//! restart of the control process. State is derived by probing: the pid
//! tells whether the worker is alive, marker lines in the artifact tell how
//! far it got.
//!
//! A recycled pid can make a finished job look alive; that is accepted.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use hostctl_core::{
    BackgroundJob, CommandRunner, JobPoll, JobSpec, JobStatus, KeyValueStore, StoreError,
    StreamError, now_millis,
};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::artifact_path;
use crate::process::{ProcessSignal, pid_exists, send_group_signal, send_signal};

/// Starts, polls and cancels background jobs.
///
/// Every read-modify-write of a record happens under one async mutex and
/// only moves a job out of `Running`, so a cancel that lands first stays
/// `Cancelled` even when a later poll sees the worker gone.
pub struct JobTracker {
    store: Arc<dyn KeyValueStore>,
    runner: Arc<dyn CommandRunner>,
    artifacts_dir: PathBuf,
    lock: Mutex<()>,
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("artifacts_dir", &self.artifacts_dir)
            .finish_non_exhaustive()
    }
}

impl JobTracker {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        runner: Arc<dyn CommandRunner>,
        artifacts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            runner,
            artifacts_dir: artifacts_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Start a worker and return the new job's id.
    ///
    /// The record is persisted before this returns, so an immediate
    /// [`poll`](Self::poll) always finds it.
    pub async fn start(&self, spec: JobSpec) -> Result<String, StreamError> {
        let total_units = self.probe_units(&spec).await;

        let id = new_job_id();
        tokio::fs::create_dir_all(&self.artifacts_dir).await?;
        let artifact = artifact_path(&self.artifacts_dir, &id);
        let out = File::create(&artifact)?;
        let err = out.try_clone()?;

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err))
            .process_group(0);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = tokio::fs::remove_file(&artifact).await;
                return Err(StreamError::spawn(&spec.command, e));
            }
        };
        let Some(pid) = child.id() else {
            return Err(StreamError::spawn(&spec.command, "worker exited before it was tracked"));
        };

        // Reap the worker so it stops answering the pid probe once it exits.
        let reap_id = id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(job = %reap_id, %status, "Job worker exited"),
                Err(e) => warn!(job = %reap_id, error = %e, "Failed to wait for job worker"),
            }
        });

        let job = BackgroundJob::started(
            id.clone(),
            spec.kind.clone(),
            pid,
            total_units,
            artifact,
            spec.markers,
            now_millis(),
        );

        let _guard = self.lock.lock().await;
        if let Err(e) = self.save(&job).await {
            kill_worker(pid);
            return Err(e.into());
        }
        info!(job = %id, kind = %job.kind, pid, total_units = job.total_units, "Job started");
        Ok(id)
    }

    /// Current state of a job, refreshed from the worker if it is running.
    pub async fn poll(&self, id: &str) -> Result<JobPoll, StreamError> {
        let _guard = self.lock.lock().await;
        let Some(mut job) = self.load(id).await? else {
            return Ok(JobPoll::NotFound);
        };
        if job.is_terminal() {
            return Ok(JobPoll::Found(job));
        }

        if refresh(&mut job).await {
            self.save(&job).await?;
            if job.is_terminal() {
                info!(job = %job.id, status = %job.status, "Job finished");
            }
        }
        Ok(JobPoll::Found(job))
    }

    /// Kill a running job's worker. Terminal jobs are returned unchanged.
    pub async fn cancel(&self, id: &str) -> Result<JobPoll, StreamError> {
        let _guard = self.lock.lock().await;
        let Some(mut job) = self.load(id).await? else {
            return Ok(JobPoll::NotFound);
        };
        if job.is_terminal() {
            return Ok(JobPoll::Found(job));
        }

        kill_worker(job.pid);
        if job.finish(JobStatus::Cancelled, now_millis()) {
            self.save(&job).await?;
            info!(job = %job.id, pid = job.pid, "Job cancelled");
        }
        Ok(JobPoll::Found(job))
    }

    /// Every known job, oldest first, with running ones refreshed.
    pub async fn list(&self) -> Result<Vec<BackgroundJob>, StreamError> {
        let keys = self.store.keys().await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            match self.poll(&key).await {
                Ok(JobPoll::Found(job)) => jobs.push(job),
                Ok(JobPoll::NotFound) => {}
                Err(e) => warn!(job = %key, error = %e, "Skipping unreadable job record"),
            }
        }
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    /// Forget a finished job: delete its record and artifact.
    pub async fn reap(&self, id: &str) -> Result<BackgroundJob, StreamError> {
        let _guard = self.lock.lock().await;
        let Some(job) = self.load(id).await? else {
            return Err(StreamError::NotFound(format!("job {id}")));
        };
        if !job.is_terminal() {
            return Err(StreamError::InvalidTarget(format!(
                "job {id} is still running; cancel it first"
            )));
        }

        self.store.delete(id).await?;
        match tokio::fs::remove_file(&job.artifact).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job = %id, error = %e, "Failed to remove job artifact"),
        }
        info!(job = %id, "Job reaped");
        Ok(job)
    }

    async fn probe_units(&self, spec: &JobSpec) -> u64 {
        let Some(probe) = &spec.probe else {
            return 1;
        };
        match self.runner.run(&probe.command, &probe.args).await {
            Ok(output) if output.success() => output.count_lines().max(1),
            Ok(output) => {
                debug!(command = %probe.command, exit_code = ?output.exit_code, "Job probe failed");
                1
            }
            Err(e) => {
                warn!(command = %probe.command, error = %e, "Job probe could not run");
                1
            }
        }
    }

    async fn load(&self, id: &str) -> Result<Option<BackgroundJob>, StoreError> {
        let Some(bytes) = self.store.get(id).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("job {id}: {e}")))
    }

    async fn save(&self, job: &BackgroundJob) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec_pretty(job).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.put(&job.id, bytes).await
    }
}

/// `job-<unix ms>-<8 hex>`
fn new_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("job-{}-{}", now_millis(), &suffix[..8])
}

/// Probe a running job. Returns whether the record changed.
///
/// A dead worker means `Done` with whatever progress the artifact shows;
/// the worker's exit code is not observed.
async fn refresh(job: &mut BackgroundJob) -> bool {
    let alive = pid_exists(job.pid);
    let scanned = count_markers(&job.artifact, &job.markers).await;
    let mut changed = job.observe_progress(scanned.unwrap_or(0));

    if !alive {
        if scanned.is_none() {
            debug!(job = %job.id, "Worker gone and artifact missing");
        }
        changed |= job.finish(JobStatus::Done, now_millis());
    } else if changed {
        job.updated_at = now_millis();
    }
    changed
}

/// Lines of the artifact that start with a marker, or `None` if it is gone.
async fn count_markers(artifact: &Path, markers: &[String]) -> Option<u64> {
    let bytes = match tokio::fs::read(artifact).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %artifact.display(), error = %e, "Failed to read job artifact");
            return Some(0);
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    let count = text
        .lines()
        .map(str::trim_start)
        .filter(|line| markers.iter().any(|m| line.starts_with(m.as_str())))
        .count();
    Some(count as u64)
}

/// SIGKILL the worker's group, falling back to the pid alone.
fn kill_worker(pid: u32) {
    match send_group_signal(pid, ProcessSignal::SIGKILL) {
        Ok(_) => {}
        Err(e) => {
            debug!(pid, error = %e, "Group kill failed, signalling worker directly");
            if let Err(e) = send_signal(pid, ProcessSignal::SIGKILL) {
                warn!(pid, error = %e, "Failed to kill job worker");
            }
        }
    }
}
