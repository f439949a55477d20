//! Session listing.

use axum::Json;
use axum::extract::State;
use hostctl_core::SessionInfo;

use crate::state::AppState;

/// `GET /api/sessions`
pub async fn list(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.sessions.list_sessions())
}
