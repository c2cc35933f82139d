//! caseta - condominium gate booth service
//!
//! Guest passes, gate admission audit, guard panic alerts and bitácora
//! escalation behind one HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Sled storage under ./data, config from ./caseta.toml if present
//! cargo run --release
//!
//! # Throwaway in-memory store, JSON logs
//! ./caseta --memory --log-json --addr 127.0.0.1:9000
//! ```
//!
//! # Environment Variables
//!
//! - `CASETA_CONFIG`: path to the TOML config file
//! - `CASETA_SERVER_ADDR`: bind address (overridden by `--addr`)
//! - `CASETA_ORACLE_API_KEY`: bearer token for the classification endpoint
//! - `CASETA_CORS_ORIGINS`: comma-separated allowed origins
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use caseta::api::{create_app, ApiState};
use caseta::classifier::{HttpOracle, Oracle, ScriptedOracle};
use caseta::config::{CasetaConfig, OracleBackend, StorageBackend};
use caseta::services::Services;
use caseta::storage::{InMemoryStore, ProcessLock, SledStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "caseta")]
#[command(about = "Condominium gate booth service: passes, gate audit, panic alerts, guard log")]
#[command(version)]
struct CliArgs {
    /// HTTP bind address
    #[arg(long, value_name = "HOST:PORT", env = "CASETA_SERVER_ADDR")]
    addr: Option<String>,

    /// Config file (takes precedence over CASETA_CONFIG and ./caseta.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use the in-memory store instead of sled (data is lost on exit)
    #[arg(long)]
    memory: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug)]
enum TaskName {
    HttpServer,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn load_config(args: &CliArgs) -> Result<CasetaConfig> {
    let mut cfg = match &args.config {
        Some(path) => CasetaConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CasetaConfig::load(),
    };

    if let Some(addr) = &args.addr {
        cfg.server.addr.clone_from(addr);
    }
    if args.memory {
        cfg.storage.backend = StorageBackend::Memory;
    }
    cfg.validate().context("Invalid configuration")?;
    Ok(cfg)
}

fn build_oracle(cfg: &CasetaConfig) -> Result<Arc<dyn Oracle>> {
    Ok(match cfg.oracle.backend {
        OracleBackend::Http => {
            info!(endpoint = %cfg.oracle.endpoint, model = %cfg.oracle.model, "Classification oracle: HTTP");
            Arc::new(HttpOracle::from_config(&cfg.oracle)?)
        }
        OracleBackend::Scripted => {
            warn!("Classification oracle: scripted keyword rules (offline mode)");
            Arc::new(ScriptedOracle::new())
        }
    })
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let in-flight requests drain
    while let Some(result) = task_set.join_next().await {
        if let Ok(Err(e)) = result {
            warn!("Task ended with error during shutdown: {}", e);
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_logging(args.log_json);

    let cfg = load_config(&args)?;

    info!("caseta {} starting", env!("CARGO_PKG_VERSION"));

    let oracle = build_oracle(&cfg)?;

    // The lock and the sled handle must outlive the server
    let (services, _process_lock, sled_store) = match cfg.storage.backend {
        StorageBackend::Sled => {
            let lock = ProcessLock::acquire(&cfg.storage.data_dir)
                .context("Failed to acquire data directory lock")?;
            info!(path = %lock.path().display(), "Data directory lock acquired");

            let db_path = cfg.storage.data_dir.join("caseta.db");
            let store = Arc::new(
                SledStore::open(&db_path)
                    .with_context(|| format!("Failed to open sled store at {}", db_path.display()))?,
            );
            info!(path = %db_path.display(), size_bytes = store.size_bytes(), "Sled store opened");
            let services = Services::build(Arc::clone(&store), oracle, &cfg);
            (services, Some(lock), Some(store))
        }
        StorageBackend::Memory => {
            warn!("In-memory store: all data is lost on exit");
            (Services::build(Arc::new(InMemoryStore::new()), oracle, &cfg), None, None)
        }
    };

    let app = create_app(ApiState::new(Arc::new(services)));
    let listener = tokio::net::TcpListener::bind(&cfg.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", cfg.server.addr))?;
    info!("HTTP API listening on http://{}/api/v2", cfg.server.addr);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    let outcome = run_supervisor(&mut task_set, cancel_token).await;

    if let Some(store) = sled_store {
        match store.flush() {
            Ok(()) => info!("Sled store flushed"),
            Err(e) => warn!(error = %e, "Failed to flush sled store on shutdown"),
        }
    }

    info!("caseta stopped");
    outcome
}
