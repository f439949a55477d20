//! Command handlers.

pub mod jobs;
pub mod paths;
pub mod serve;
