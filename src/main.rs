#![forbid(unsafe_code)]

//! `pilot-orchestrator` — chat-driven coding assistant orchestrator.
//!
//! Bootstraps configuration and credentials, wires the orchestration
//! components to the console transport and the host CLI executor, and runs
//! until SIGINT/SIGTERM or end of input.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pilot_orchestrator::classifier::{AnthropicClassifier, RemoteClassifier};
use pilot_orchestrator::config::GlobalConfig;
use pilot_orchestrator::driver::CliExecutor;
use pilot_orchestrator::service::{Collaborators, Orchestrator};
use pilot_orchestrator::store::memory::{MemoryHistoryStore, DEFAULT_CAPACITY};
use pilot_orchestrator::transport::console::ConsoleMessenger;
use pilot_orchestrator::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "pilot-orchestrator",
    about = "Chat-driven coding assistant orchestrator",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured project directory.
    #[arg(long)]
    project: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("pilot-orchestrator bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;

    if let Some(project) = args.project {
        let canonical = project
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid project override: {err}")))?;
        config.project_path = canonical;
    }

    config.load_credentials().await?;
    let config = Arc::new(config);
    info!(project = %config.project_path.display(), "configuration loaded");

    // ── Build collaborators ─────────────────────────────
    let remote: Option<Arc<dyn RemoteClassifier>> = if config.classifier.enabled {
        match AnthropicClassifier::new(&config.classifier) {
            Ok(classifier) => Some(Arc::new(classifier)),
            Err(err) => {
                warn!(%err, "remote classifier unavailable, using local rules");
                None
            }
        }
    } else {
        None
    };

    let parts = Collaborators {
        messenger: Arc::new(ConsoleMessenger::new(tokio::io::stdout())),
        executor: Arc::new(CliExecutor::from_config(&config)),
        remote,
        history: Some(Arc::new(MemoryHistoryStore::new(DEFAULT_CAPACITY))),
    };

    // ── Start service ───────────────────────────────────
    let mut service = Orchestrator::new(Arc::clone(&config), parts);
    service.start();
    service.start_intake(tokio::io::stdin());
    info!("orchestrator ready, reading messages from stdin");

    // ── Wait for shutdown signal ────────────────────────
    let stopped = service.cancellation();
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = stopped.cancelled() => {}
    }

    service.shutdown().await;
    info!("pilot-orchestrator shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
