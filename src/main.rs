#![forbid(unsafe_code)]

//! `session-worker`: single-job coding-assistant worker binary.
//!
//! Loads configuration, wires the storage, git, agent, summarizer and
//! remote-sink collaborators, then serves HTTP until its one job finishes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use session_worker::config::GlobalConfig;
use session_worker::events::{HttpRemoteSink, RemoteSink};
use session_worker::execution::CliAgent;
use session_worker::orchestrator::JobDeps;
use session_worker::server::{self, ServerState};
use session_worker::storage::LocalStorage;
use session_worker::summarize::{MessagesApiSummarizer, Summarizer};
use session_worker::vcs::GitCli;
use session_worker::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "session-worker", about = "Single-job coding-assistant worker", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("session-worker bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!(
        workspace_root = %config.workspace_root.display(),
        storage_root = %config.storage_root.display(),
        "configuration loaded"
    );

    let deps = build_deps(Arc::clone(&config))?;

    let shutdown = CancellationToken::new();
    let signal_ct = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    server::serve(ServerState::new(deps, shutdown), config.http_port).await?;
    info!("session-worker shut down");
    Ok(())
}

fn build_deps(config: Arc<GlobalConfig>) -> Result<JobDeps> {
    let storage = Arc::new(LocalStorage::new(config.storage_root.clone())?);

    let summarizer: Option<Arc<dyn Summarizer>> = match config.summarizer {
        Some(ref section) => Some(Arc::new(MessagesApiSummarizer::new(section)?)),
        None => {
            info!("summarizer not configured; using fallback names and commit messages");
            None
        }
    };

    let remote_sink: Option<Arc<dyn RemoteSink>> = match config.remote_sink {
        Some(ref section) => Some(Arc::new(HttpRemoteSink::new(section)?)),
        None => None,
    };

    Ok(JobDeps {
        storage: Arc::clone(&storage) as _,
        metadata: storage,
        vcs: Arc::new(GitCli::new(&config.repository)),
        execution: Arc::new(CliAgent::new(&config.agent)),
        summarizer,
        remote_sink,
        config,
    })
}

/// Wait for Ctrl-C (all platforms) or SIGTERM (Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

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
