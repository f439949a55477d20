//! Axum server bootstrap - the composition root.
//!
//! This module is the ONLY place where the runtime is wired together for the
//! web adapter. All concrete implementations are instantiated here.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hostctl_core::{
    Settings, StaticTokenVerifier, TokenVerifier, data_root, ensure_directory, jobs_dir,
    validate_settings,
};
use hostctl_runtime::{
    FsKeyValueStore, JobTracker, SessionConfig, SessionRegistry, SystemLogLauncher,
    TokioCommandRunner,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long open streams may take to finish after a shutdown signal.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins (production mode).
    AllowOrigins(Vec<String>),
}

/// Server configuration for the Axum adapter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Root for job records, artifacts and diagnostic logs.
    pub data_root: PathBuf,
    pub settings: Settings,
    pub cors: CorsConfig,
    /// Token required on `/api/*`. `None` disables the check.
    pub auth_token: Option<String>,
}

impl ServerConfig {
    /// Create config with default paths.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8787,
            data_root: data_root()?,
            settings: Settings::with_defaults(),
            cors: CorsConfig::default(),
            auth_token: None,
        })
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set CORS to allow specific origins.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors = CorsConfig::AllowOrigins(origins);
        self
    }

    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Application context for the Axum adapter.
pub struct AxumContext {
    /// Shared log sessions and terminals.
    pub sessions: SessionRegistry,
    /// Background job tracking.
    pub jobs: Arc<JobTracker>,
    /// Token check for `/api/*`, if enabled.
    pub verifier: Option<Arc<dyn TokenVerifier>>,
}

/// Build every service the routes need.
pub fn bootstrap(config: &ServerConfig) -> Result<AxumContext> {
    let settings = &config.settings;
    validate_settings(settings).context("invalid settings")?;

    let jobs_dir = jobs_dir(&config.data_root);
    ensure_directory(&jobs_dir)?;

    info!(
        target: "hostctl.paths",
        data_root = %config.data_root.display(),
        jobs_dir = %jobs_dir.display(),
        "Axum bootstrap resolved paths"
    );

    // 1. Log sources and the session registry
    let launcher = Arc::new(SystemLogLauncher::new(
        settings.effective_initial_lines(),
        settings.effective_output_buffer_bytes(),
        &jobs_dir,
    ));
    let session_config = SessionConfig::from_settings(settings);
    info!(
        grace_ms = session_config.grace_period.as_millis(),
        subscriber_queue = session_config.subscriber_queue,
        history_lines = session_config.history_lines,
        "Session registry configured"
    );
    let sessions = SessionRegistry::new(session_config, launcher);

    // 2. Job tracker over the file store
    let store = Arc::new(FsKeyValueStore::new(&jobs_dir));
    let runner = Arc::new(TokioCommandRunner::default());
    let jobs = Arc::new(JobTracker::new(store, runner, &jobs_dir));

    // 3. Auth
    let verifier = config.auth_token.as_ref().map(|token| {
        Arc::new(StaticTokenVerifier::new(token.clone())) as Arc<dyn TokenVerifier>
    });
    if verifier.is_none() {
        warn!("No API token configured; /api is unauthenticated");
    }

    Ok(AxumContext {
        sessions,
        jobs,
        verifier,
    })
}

/// Start the web server and run until SIGINT/SIGTERM.
///
/// On shutdown every session is torn down, which ends open log streams and
/// terminals; connections still open after a short drain are dropped.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let ctx = bootstrap(&config)?;
    let registry = ctx.sessions.clone();
    let app = crate::routes::create_router(ctx, &config.cors);

    let addr = config.addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("hostctl listening on http://{}", addr);

    let (stopping_tx, stopping_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!("Shutdown requested; closing sessions");
        registry.shutdown();
        let _ = stopping_tx.send(());
    });

    tokio::select! {
        result = server.into_future() => result?,
        () = async {
            let _ = stopping_rx.await;
            tokio::time::sleep(SHUTDOWN_DRAIN).await;
        } => warn!("Connections still open after drain; exiting anyway"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
