//! `hostctl paths`.

use anyhow::Result;
use hostctl_core::{jobs_dir, logs_dir};

use crate::config::CliConfig;

pub fn execute(config: &CliConfig) -> Result<()> {
    println!("Data root: {}", config.data_root.display());
    println!("Jobs:      {}", jobs_dir(&config.data_root).display());
    println!("Logs:      {}", logs_dir(&config.data_root).display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config.settings)?);
    Ok(())
}
