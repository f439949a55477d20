//! HTTP request handlers for the Axum web server.
//!
//! Handlers are thin: they validate input, call the session registry or
//! the job tracker, and shape the response.

pub mod jobs;
pub mod logs;
pub mod sessions;
pub mod terminal;
