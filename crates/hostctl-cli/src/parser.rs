//! Root CLI structure and global options.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Host control plane: shared log streams, terminals and background jobs.
#[derive(Parser)]
#[command(name = "hostctl")]
#[command(about = "Stream host logs, terminals and background jobs to the browser")]
#[command(version)]
pub struct Cli {
    /// Override the data directory for this invocation
    #[arg(long = "data-dir", global = true, env = "HOSTCTL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON settings file merged over the defaults
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::JobCommand;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "hostctl",
            "--verbose",
            "--data-dir",
            "/tmp/hostctl",
            "jobs",
            "list",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/hostctl")));
        assert!(matches!(
            cli.command,
            Some(Commands::Jobs {
                command: JobCommand::List
            })
        ));
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::parse_from([
            "hostctl",
            "serve",
            "--port",
            "9000",
            "--host",
            "0.0.0.0",
            "--allow-origin",
            "https://a.example",
            "--allow-origin",
            "https://b.example",
        ]);
        let Some(Commands::Serve {
            host,
            port,
            allow_origin,
            ..
        }) = cli.command
        else {
            panic!("expected serve");
        };
        assert_eq!(port, 9000);
        assert_eq!(host.to_string(), "0.0.0.0");
        assert_eq!(allow_origin.len(), 2);
    }

    #[test]
    fn test_job_id_is_required() {
        assert!(Cli::try_parse_from(["hostctl", "jobs", "cancel"]).is_err());
        let cli = Cli::try_parse_from(["hostctl", "jobs", "cancel", "job-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Jobs {
                command: JobCommand::Cancel { ref id }
            }) if id == "job-1"
        ));
    }
}
