//! `hostctl jobs ...`: offline access to the job records.
//!
//! These commands run without a server. A job whose worker was started by a
//! server that has since exited is still followed through its pid and
//! artifact.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use hostctl_core::{BackgroundJob, JobPoll, ensure_directory, jobs_dir};
use hostctl_runtime::{FsKeyValueStore, JobTracker, TokioCommandRunner};
use serde_json::{Value, json};

use crate::commands::JobCommand;
use crate::config::CliConfig;

/// Tracker over the job records in the data root.
pub fn tracker(config: &CliConfig) -> Result<JobTracker> {
    let dir = jobs_dir(&config.data_root);
    ensure_directory(&dir)?;
    Ok(JobTracker::new(
        Arc::new(FsKeyValueStore::new(&dir)),
        Arc::new(TokioCommandRunner::default()),
        dir,
    ))
}

fn view(job: &BackgroundJob) -> Value {
    let mut value = json!(job);
    value["percent"] = json!(job.percent());
    value
}

fn found(id: &str, poll: JobPoll) -> Result<BackgroundJob> {
    poll.into_job().ok_or_else(|| anyhow!("job not found: {id}"))
}

/// Run one job command and return what it reports.
pub async fn run(tracker: &JobTracker, command: JobCommand) -> Result<Value> {
    let value = match command {
        JobCommand::List => Value::Array(tracker.list().await?.iter().map(view).collect()),
        JobCommand::Status { id } => view(&found(&id, tracker.poll(&id).await?)?),
        JobCommand::Cancel { id } => view(&found(&id, tracker.cancel(&id).await?)?),
        JobCommand::Reap { id } => view(&tracker.reap(&id).await?),
    };
    Ok(value)
}

pub async fn execute(config: &CliConfig, command: JobCommand) -> Result<()> {
    let tracker = tracker(config)?;
    let value = run(&tracker, command).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
