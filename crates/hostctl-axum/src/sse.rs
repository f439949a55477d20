//! Server-sent event streams for log subscriptions.
//!
//! | Event | Data | When |
//! |---|---|---|
//! | (default) | `LogRecord` JSON | every record |
//! | `error` | `{"error": ...}` | the client fell behind and was dropped |
//! | `end` | `{}` | the log source exited |
//!
//! A keep-alive comment is sent every 30 seconds.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures_util::stream::{self, BoxStream, StreamExt};
use hostctl_core::{LogRecord, StreamError};
use hostctl_runtime::LogSubscription;

pub type EventStream = BoxStream<'static, Result<Event, Infallible>>;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Wrap an event stream in an SSE response with keep-alive pings.
pub fn into_sse(stream: EventStream) -> Sse<KeepAliveStream<EventStream>> {
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("ping"),
    )
}

/// Events for one subscription. Ends after `error` or `end`.
pub fn subscription_events(subscription: LogSubscription) -> EventStream {
    stream::unfold(Some(subscription), |state| async move {
        let mut subscription = state?;
        match subscription.recv().await {
            Some(Ok(record)) => Some((Ok(record_event(&record)), Some(subscription))),
            Some(Err(e)) => {
                tracing::debug!(session = %subscription.session_id(), error = %e, "SSE subscriber dropped");
                Some((Ok(error_event(&e)), None))
            }
            None => Some((Ok(Event::default().event("end").data("{}")), None)),
        }
    })
    .boxed()
}

/// A single synthetic error record, then keep-alives only.
///
/// Used when the log source cannot be started, so the client shows the
/// reason instead of reconnecting in a loop.
pub fn failure_events(source: &str, err: &StreamError) -> EventStream {
    let record = LogRecord::source_failure(source, err);
    stream::once(async move { Ok(record_event(&record)) })
        .chain(stream::pending())
        .boxed()
}

fn record_event(record: &LogRecord) -> Event {
    match serde_json::to_string(record) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            tracing::warn!("Failed to serialize log record: {}", e);
            Event::default().comment("unserializable record")
        }
    }
}

fn error_event(err: &StreamError) -> Event {
    let body = serde_json::json!({ "error": err.to_string() });
    Event::default().event("error").data(body.to_string())
}
