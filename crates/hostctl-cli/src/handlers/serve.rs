//! `hostctl serve`.

use std::net::IpAddr;

use anyhow::Result;
use hostctl_axum::{CorsConfig, ServerConfig, start_server};

use crate::config::CliConfig;

/// Build the server configuration from CLI flags.
pub fn server_config(
    config: &CliConfig,
    host: IpAddr,
    port: u16,
    token: Option<String>,
    allow_origin: Vec<String>,
) -> ServerConfig {
    let cors = if allow_origin.is_empty() {
        CorsConfig::AllowAll
    } else {
        CorsConfig::AllowOrigins(allow_origin)
    };
    ServerConfig {
        host,
        port,
        data_root: config.data_root.clone(),
        settings: config.settings.clone(),
        cors,
        auth_token: token.filter(|t| !t.trim().is_empty()),
    }
}

pub async fn execute(server: ServerConfig) -> Result<()> {
    start_server(server).await
}
