//! Background job handlers.

use std::path::PathBuf;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAliveStream, Sse};
use hostctl_core::{BackgroundJob, JobPoll, JobSpec, LogTarget, StreamError};
use serde::{Deserialize, Serialize};

use crate::error::HttpError;
use crate::handlers::logs;
use crate::sse::EventStream;
use crate::state::AppState;

/// Request to start a job.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CreateJobRequest {
    /// Extract `archive`; `destination` defaults to the archive's directory.
    Unzip {
        archive: PathBuf,
        destination: Option<PathBuf>,
    },
    /// Archive `paths` (all in one directory) into `destination`.
    Zip {
        paths: Vec<PathBuf>,
        destination: PathBuf,
    },
}

impl CreateJobRequest {
    fn into_spec(self) -> Result<JobSpec, StreamError> {
        match self {
            Self::Unzip {
                archive,
                destination,
            } => JobSpec::unzip(&archive, destination.as_deref()),
            Self::Zip { paths, destination } => JobSpec::zip(&paths, &destination),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: String,
}

/// A job record plus its progress as a percentage.
#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: BackgroundJob,
    pub percent: u8,
}

impl From<BackgroundJob> for JobView {
    fn from(job: BackgroundJob) -> Self {
        let percent = job.percent();
        Self { job, percent }
    }
}

fn found(poll: JobPoll, id: &str) -> Result<Json<JobView>, HttpError> {
    poll.into_job()
        .map(|job| Json(job.into()))
        .ok_or_else(|| HttpError::NotFound(format!("job {id}")))
}

/// `POST /api/jobs`
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), HttpError> {
    let spec = request.into_spec()?;
    let job_id = state.jobs.start(spec).await?;
    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse { job_id })))
}

/// `GET /api/jobs`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<JobView>>, HttpError> {
    let jobs = state.jobs.list().await?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

/// `GET /api/jobs/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, HttpError> {
    let poll = state.jobs.poll(&id).await?;
    found(poll, &id)
}

/// `POST /api/jobs/{id}/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, HttpError> {
    let poll = state.jobs.cancel(&id).await?;
    found(poll, &id)
}

/// `DELETE /api/jobs/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, HttpError> {
    match state.jobs.reap(&id).await {
        Ok(job) => Ok(Json(job.into())),
        Err(StreamError::InvalidTarget(msg)) => Err(HttpError::Conflict(msg)),
        Err(e) => Err(e.into()),
    }
}

/// `GET /api/jobs/{id}/stream`
pub async fn stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<KeepAliveStream<EventStream>>, HttpError> {
    let target = LogTarget::job(id)?;
    logs::subscribe(&state, target).await
}
