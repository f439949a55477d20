//! Data root and settings resolution for a single invocation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hostctl_core::{Settings, data_root, ensure_directory, validate_settings};

/// Resolved locations and settings shared by every command.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub data_root: PathBuf,
    pub settings: Settings,
}

impl CliConfig {
    /// Resolve the data root (`--data-dir` first) and load settings.
    pub fn resolve(data_dir: Option<&Path>, settings_file: Option<&Path>) -> Result<Self> {
        let data_root = match data_dir {
            Some(dir) => {
                ensure_directory(dir)?;
                dir.to_path_buf()
            }
            None => data_root()?,
        };
        Ok(Self {
            data_root,
            settings: load_settings(settings_file)?,
        })
    }
}

/// Defaults, overlaid with the fields a JSON settings file sets.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::with_defaults();
    if let Some(path) = path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let overrides: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("invalid settings file {}", path.display()))?;
        settings.merge(&overrides);
    }
    validate_settings(&settings).context("invalid settings")?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostctl_core::settings::{DEFAULT_GRACE_PERIOD_MS, DEFAULT_HISTORY_LINES};
    use tempfile::TempDir;

    #[test]
    fn test_no_file_gives_defaults() {
        assert_eq!(load_settings(None).unwrap(), Settings::with_defaults());
    }

    #[test]
    fn test_file_overrides_only_what_it_sets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "subscriber_queue": 16, "terminal_shell": "zsh" }"#).unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.subscriber_queue, Some(16));
        assert_eq!(settings.terminal_shell.as_deref(), Some("zsh"));
        assert_eq!(settings.grace_period_ms, Some(DEFAULT_GRACE_PERIOD_MS));
        assert_eq!(settings.history_lines, Some(DEFAULT_HISTORY_LINES));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "subscriber_queue": 0 }"#).unwrap();
        assert!(load_settings(Some(&path)).is_err());

        std::fs::write(&path, "not json").unwrap();
        assert!(load_settings(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_settings(Some(&dir.path().join("absent.json"))).is_err());
    }

    #[test]
    fn test_explicit_data_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("root");
        let config = CliConfig::resolve(Some(&root), None).unwrap();
        assert_eq!(config.data_root, root);
        assert!(root.is_dir());
    }
}
