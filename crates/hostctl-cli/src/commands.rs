//! Subcommands.

use std::net::{IpAddr, Ipv4Addr};

use clap::Subcommand;

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/SSE/WebSocket server
    Serve {
        /// Address to bind
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        host: IpAddr,
        /// Port to listen on
        #[arg(short, long, default_value_t = 8787)]
        port: u16,
        /// Token required on /api requests (Bearer header or auth_token cookie)
        #[arg(long, env = "HOSTCTL_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Allowed CORS origin; repeat for several. All origins when omitted
        #[arg(long = "allow-origin")]
        allow_origin: Vec<String>,
    },

    /// Inspect background jobs recorded in the data directory
    Jobs {
        #[command(subcommand)]
        command: JobCommand,
    },

    /// Show resolved paths and effective settings
    Paths,
}

/// Offline job operations. They read and update the same records the
/// server does.
#[derive(Subcommand)]
pub enum JobCommand {
    /// List every recorded job
    List,
    /// Show one job, refreshing its progress
    Status { id: String },
    /// Kill a running job's worker and mark it cancelled
    Cancel { id: String },
    /// Delete a finished job's record and output
    Reap { id: String },
}
