//! CLI entry point - the composition root.

use clap::{CommandFactory, Parser};
use hostctl_cli::{Cli, CliConfig, Commands, handlers, init_tracing};
use hostctl_core::logs_dir;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads `env` defaults
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::resolve(cli.data_dir.as_deref(), cli.settings.as_deref())?;
    let _guard = init_tracing(&logs_dir(&config.data_root), cli.verbose);
    info!(data_root = %config.data_root.display(), "hostctl starting");

    match command {
        Commands::Serve {
            host,
            port,
            token,
            allow_origin,
        } => {
            let server = handlers::serve::server_config(&config, host, port, token, allow_origin);
            handlers::serve::execute(server).await?;
        }
        Commands::Jobs { command } => {
            handlers::jobs::execute(&config, command).await?;
        }
        Commands::Paths => {
            handlers::paths::execute(&config)?;
        }
    }

    Ok(())
}
