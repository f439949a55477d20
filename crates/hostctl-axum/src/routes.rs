//! Route definitions and router construction.

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_token;
use crate::bootstrap::{AxumContext, CorsConfig};
use crate::handlers;
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            use axum::http::HeaderValue;
            let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// All API routes without the `/api` prefix.
pub(crate) fn api_routes() -> Router<AppState> {
    Router::new()
        // Log streams (SSE)
        .route("/logs/{service}/stream", get(handlers::logs::stream))
        .route("/pm2/logs/{process}/stream", get(handlers::logs::pm2_stream))
        // Sessions
        .route("/sessions", get(handlers::sessions::list))
        // Terminal (WebSocket)
        .route("/terminal", get(handlers::terminal::connect))
        // Background jobs
        .route(
            "/jobs",
            get(handlers::jobs::list).post(handlers::jobs::create),
        )
        .route(
            "/jobs/{id}",
            get(handlers::jobs::get).delete(handlers::jobs::remove),
        )
        .route("/jobs/{id}/cancel", post(handlers::jobs::cancel))
        .route("/jobs/{id}/stream", get(handlers::jobs::stream))
}

/// Create the main Axum router.
///
/// `/health` is always open; `/api/*` requires a token when the context
/// carries a verifier.
pub fn create_router(ctx: AxumContext, cors_config: &CorsConfig) -> Router {
    let verifier = ctx.verifier.clone();
    let state: AppState = Arc::new(ctx);
    let cors = build_cors_layer(cors_config);

    let mut api: Router = api_routes().with_state(state);
    if let Some(verifier) = verifier {
        api = api.route_layer(middleware::from_fn_with_state(verifier, require_token));
    }

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api.layer(cors))
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint.
pub(crate) async fn health_check() -> &'static str {
    "OK"
}
