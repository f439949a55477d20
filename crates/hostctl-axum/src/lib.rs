//! Axum web adapter for hostctl.
//!
//! Exposes the session registry and the job tracker over HTTP:
//! SSE for log and job-output streams, a WebSocket for terminals, and
//! plain JSON routes for job control and session listing.

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod sse;
pub mod state;

// Re-export primary types
pub use bootstrap::{AxumContext, CorsConfig, ServerConfig, bootstrap, start_server};
pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;
