//! Log streaming handlers.

use axum::extract::{Path, State};
use axum::response::sse::{KeepAliveStream, Sse};
use hostctl_core::{LogTarget, StreamError};

use crate::error::HttpError;
use crate::sse::{EventStream, failure_events, into_sse, subscription_events};
use crate::state::AppState;

/// `GET /api/logs/{service}/stream`
pub async fn stream(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Sse<KeepAliveStream<EventStream>>, HttpError> {
    let target = LogTarget::service(service)?;
    subscribe(&state, target).await
}

/// `GET /api/pm2/logs/{process}/stream`, where `process` is a pm id, an
/// app name or `all`.
pub async fn pm2_stream(
    State(state): State<AppState>,
    Path(process): Path<String>,
) -> Result<Sse<KeepAliveStream<EventStream>>, HttpError> {
    let target = LogTarget::pm2(process)?;
    subscribe(&state, target).await
}

/// Attach to `target`. A source that cannot be started is reported inside
/// the stream rather than as an HTTP error.
pub(crate) async fn subscribe(
    state: &AppState,
    target: LogTarget,
) -> Result<Sse<KeepAliveStream<EventStream>>, HttpError> {
    match state.sessions.subscribe_logs(target.clone()).await {
        Ok(subscription) => {
            tracing::debug!(
                session = %subscription.session_id(),
                %target,
                "SSE client attached"
            );
            Ok(into_sse(subscription_events(subscription)))
        }
        Err(e @ StreamError::Spawn { .. }) => {
            tracing::warn!(%target, error = %e, "Log source unavailable");
            Ok(into_sse(failure_events(target.name(), &e)))
        }
        Err(e) => Err(e.into()),
    }
}
