//! Where each log target's lines come from.
//!
//! A handful of services log to well-known files; everything else is read
//! from the systemd journal. PM2 apps go through `pm2 logs`. Background
//! jobs are followed through the artifact file their worker writes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hostctl_core::{LogRecord, LogTarget, StreamError};
use tracing::debug;

use crate::jobs::artifact_path;
use crate::process::{IoMode, ProcessHandle, SpawnSpec};

const NGINX_DIRS: &[&str] = &[
    "/opt/homebrew/var/log/nginx",
    "/usr/local/var/log/nginx",
    "/var/log/nginx",
];

const APACHE_ACCESS_LOGS: &[&str] = &[
    "/opt/homebrew/var/log/httpd/access_log",
    "/usr/local/var/log/httpd/access_log",
    "/var/log/apache2/access.log",
    "/var/log/httpd/access_log",
];

const CLOUDFLARED_LOGS: &[&str] = &[
    "/opt/homebrew/var/log/cloudflared.log",
    "/usr/local/var/log/cloudflared.log",
    "/var/log/cloudflared.log",
    "/tmp/cloudflared.log",
];

/// History lines per app when following every PM2 process.
const PM2_ALL_LINES: u32 = 15;
/// History lines when following a single PM2 process.
const PM2_PROCESS_LINES: u32 = 50;

/// How a target is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePlan {
    /// Follow the first existing file among the candidates.
    File { candidates: Vec<PathBuf> },
    /// `journalctl` with these arguments.
    Journal { args: Vec<String> },
    /// A background job's artifact, from its first line.
    Artifact { path: PathBuf },
    /// `pm2` with these arguments. Error-log lines arrive on stderr.
    Pm2 { args: Vec<String> },
}

/// Resolve the plan for `target`.
pub fn plan_source(target: &LogTarget, initial_lines: u32, jobs_dir: &Path) -> SourcePlan {
    let n = initial_lines.to_string();
    match target {
        LogTarget::Job(id) => SourcePlan::Artifact {
            path: artifact_path(jobs_dir, id),
        },
        LogTarget::Pm2(process) => {
            let lines = if target.is_all_pm2() {
                PM2_ALL_LINES
            } else {
                PM2_PROCESS_LINES
            };
            SourcePlan::Pm2 {
                args: vec![
                    "logs".into(),
                    process.clone(),
                    "--raw".into(),
                    "--lines".into(),
                    lines.to_string(),
                ],
            }
        }
        LogTarget::Service(name) => match name.as_str() {
            "nginx" => SourcePlan::File {
                candidates: NGINX_DIRS.iter().map(|d| Path::new(d).join("access.log")).collect(),
            },
            "nginx-error" => SourcePlan::File {
                candidates: NGINX_DIRS.iter().map(|d| Path::new(d).join("error.log")).collect(),
            },
            "apache-access" => SourcePlan::File {
                candidates: APACHE_ACCESS_LOGS.iter().map(PathBuf::from).collect(),
            },
            "cloudflared" => SourcePlan::File {
                candidates: CLOUDFLARED_LOGS.iter().map(PathBuf::from).collect(),
            },
            "php-fpm" | "all-php" => SourcePlan::Journal {
                args: journal_args(&n, "php*-fpm"),
            },
            unit => SourcePlan::Journal {
                args: journal_args(&n, unit),
            },
        },
    }
}

fn journal_args(lines: &str, unit: &str) -> Vec<String> {
    ["--no-pager", "-f", "-n", lines, "-o", "json", "-u", unit]
        .into_iter()
        .map(String::from)
        .collect()
}

/// A freshly started log source.
#[derive(Debug)]
pub struct LaunchedSource {
    pub handle: ProcessHandle,
    /// Records published before any process output
    pub preamble: Vec<LogRecord>,
}

/// Starts the process behind a log target.
#[async_trait]
pub trait LogSourceLauncher: Send + Sync {
    async fn launch(&self, target: &LogTarget) -> Result<LaunchedSource, StreamError>;
}

/// Launcher backed by `tail`, `journalctl` and `pm2`.
#[derive(Debug, Clone)]
pub struct SystemLogLauncher {
    initial_lines: u32,
    output_buffer_bytes: usize,
    jobs_dir: PathBuf,
}

impl SystemLogLauncher {
    pub fn new(initial_lines: u32, output_buffer_bytes: usize, jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            initial_lines,
            output_buffer_bytes,
            jobs_dir: jobs_dir.into(),
        }
    }

    fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle, StreamError> {
        ProcessHandle::spawn(spec, IoMode::Pipes, self.output_buffer_bytes)
    }
}

#[async_trait]
impl LogSourceLauncher for SystemLogLauncher {
    async fn launch(&self, target: &LogTarget) -> Result<LaunchedSource, StreamError> {
        match plan_source(target, self.initial_lines, &self.jobs_dir) {
            SourcePlan::File { candidates } => {
                let Some(path) = first_existing(&candidates).await else {
                    let checked: Vec<String> =
                        candidates.iter().map(|p| p.display().to_string()).collect();
                    return Err(StreamError::spawn(
                        "tail",
                        format!("Log file not found. Checked: {}", checked.join(", ")),
                    ));
                };
                debug!(%target, path = %path.display(), "Tailing log file");
                let handle = self.spawn(SpawnSpec::new(
                    "tail",
                    [
                        "-F".to_string(),
                        "-n".to_string(),
                        self.initial_lines.to_string(),
                        path.display().to_string(),
                    ],
                ))?;
                Ok(LaunchedSource {
                    handle,
                    preamble: vec![LogRecord::info_now(
                        format!("Streaming logs from {}", path.display()),
                        target.name(),
                    )],
                })
            }
            SourcePlan::Journal { args } => {
                debug!(%target, "Following journal");
                let handle = self.spawn(SpawnSpec::new("journalctl", args))?;
                Ok(LaunchedSource {
                    handle,
                    preamble: Vec::new(),
                })
            }
            SourcePlan::Pm2 { args } => {
                debug!(%target, "Following pm2 logs");
                let handle = self.spawn(SpawnSpec::new("pm2", args))?;
                Ok(LaunchedSource {
                    handle,
                    preamble: Vec::new(),
                })
            }
            SourcePlan::Artifact { path } => {
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(StreamError::NotFound(format!(
                        "no output for job {}",
                        target.name()
                    )));
                }
                let handle = self.spawn(SpawnSpec::new(
                    "tail",
                    [
                        "-n".to_string(),
                        "+1".to_string(),
                        "-F".to_string(),
                        path.display().to_string(),
                    ],
                ))?;
                Ok(LaunchedSource {
                    handle,
                    preamble: Vec::new(),
                })
            }
        }
    }
}

async fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    for path in candidates {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Some(path.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_services_are_file_backed() {
        let plan = plan_source(&LogTarget::service("nginx").unwrap(), 100, Path::new("/j"));
        let SourcePlan::File { candidates } = plan else {
            panic!("nginx should be file-backed");
        };
        assert_eq!(candidates[0], PathBuf::from("/opt/homebrew/var/log/nginx/access.log"));
        assert_eq!(candidates.len(), 3);

        let plan = plan_source(&LogTarget::service("cloudflared").unwrap(), 100, Path::new("/j"));
        assert!(matches!(plan, SourcePlan::File { ref candidates } if candidates.len() == 4));
    }

    #[test]
    fn php_aliases_use_unit_glob() {
        for name in ["php-fpm", "all-php"] {
            let plan = plan_source(&LogTarget::service(name).unwrap(), 50, Path::new("/j"));
            let SourcePlan::Journal { args } = plan else {
                panic!("php should use the journal");
            };
            assert!(args.windows(2).any(|w| w == ["-u", "php*-fpm"]));
            assert!(args.windows(2).any(|w| w == ["-n", "50"]));
        }
    }

    #[test]
    fn other_units_follow_journal() {
        let plan = plan_source(&LogTarget::service("php8.2-fpm").unwrap(), 100, Path::new("/j"));
        assert_eq!(
            plan,
            SourcePlan::Journal {
                args: journal_args("100", "php8.2-fpm")
            }
        );
    }

    #[test]
    fn jobs_follow_their_artifact() {
        let plan = plan_source(&LogTarget::job("job-1").unwrap(), 100, Path::new("/data/jobs"));
        assert_eq!(
            plan,
            SourcePlan::Artifact {
                path: PathBuf::from("/data/jobs/job-1.log")
            }
        );
    }

    #[test]
    fn pm2_history_depends_on_scope() {
        let plan = plan_source(&LogTarget::pm2("all").unwrap(), 100, Path::new("/j"));
        assert_eq!(
            plan,
            SourcePlan::Pm2 {
                args: vec![
                    "logs".into(),
                    "all".into(),
                    "--raw".into(),
                    "--lines".into(),
                    "15".into()
                ]
            }
        );

        let plan = plan_source(&LogTarget::pm2("2").unwrap(), 100, Path::new("/j"));
        let SourcePlan::Pm2 { args } = plan else {
            panic!("pm2 targets go through pm2 logs");
        };
        assert_eq!(args[1], "2");
        assert!(args.windows(2).any(|w| w == ["--lines", "50"]));
    }

    #[test]
    fn pm2_and_service_of_same_name_differ() {
        let pm2 = plan_source(&LogTarget::pm2("nginx").unwrap(), 100, Path::new("/j"));
        let service = plan_source(&LogTarget::service("nginx").unwrap(), 100, Path::new("/j"));
        assert!(matches!(pm2, SourcePlan::Pm2 { .. }));
        assert!(matches!(service, SourcePlan::File { .. }));
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = SystemLogLauncher::new(100, 64 * 1024, dir.path());
        let err = launcher
            .launch(&LogTarget::job("job-missing").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::NotFound(_)));
    }

    #[tokio::test]
    async fn artifact_is_tailed_from_the_start() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(artifact_path(dir.path(), "job-1"), "  inflating: a.txt\n").unwrap();
        let launcher = SystemLogLauncher::new(100, 64 * 1024, dir.path());

        let launched = launcher.launch(&LogTarget::job("job-1").unwrap()).await.unwrap();
        let mut output = launched.handle.take_output().unwrap();
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), output.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8_lossy(&chunk.data).contains("inflating: a.txt"));
    }
}
