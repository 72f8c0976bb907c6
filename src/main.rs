//! outdial - Call Lifecycle & Outcome Reconciliation Engine
//!
//! Drives outbound AI phone calls from initiation to a classified outcome:
//! webhook ingestion, provider reconciliation, transcript classification,
//! and campaign launch dedup.
//!
//! # Usage
//!
//! ```bash
//! PROVIDER_API_KEY=sk-... cargo run --release
//!
//! # Custom bind address
//! cargo run --release -- --addr 127.0.0.1:9000
//! ```
//!
//! # Environment Variables
//!
//! - `PROVIDER_API_KEY`: Voice provider credential (required for dialing)
//! - `PROVIDER_BASE_URL`: Provider API base URL
//! - `PROVIDER_WEBHOOK_URL`: Public URL the provider pushes events to
//! - `OUTDIAL_SYNC_CONCURRENCY`: Parallelism for batch sync (default: 8)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use outdial::api::{create_app, ApiState};
use outdial::campaign::CampaignLauncher;
use outdial::config::AppConfig;
use outdial::lifecycle::{run_enrichment_worker, LifecycleManager};
use outdial::provider::{DisabledGateway, ProviderApi, ProviderClient};
use outdial::store::{MemoryStore, Store};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "outdial")]
#[command(about = "Call Lifecycle & Outcome Reconciliation Engine")]
#[command(version)]
struct CliArgs {
    /// Override the server bind address (default: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the server port (ignored when --addr is given)
    #[arg(short, long)]
    port: Option<u16>,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    EnrichmentWorker,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::EnrichmentWorker => write!(f, "EnrichmentWorker"),
        }
    }
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {task_name} completed normally");
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed: {e}");
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {e}");
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {e}"));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = AppConfig::from_env(args.addr, args.port);

    info!("outdial {} starting", env!("CARGO_PKG_VERSION"));

    let provider: Arc<dyn ProviderApi> = match ProviderClient::new(&config.provider) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "Provider gateway disabled; webhook ingestion still available");
            Arc::new(DisabledGateway)
        }
    };

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let (lifecycle, enrichment_rx) =
        LifecycleManager::new(Arc::clone(&store), provider, config.provider.clone());
    let launcher = Arc::new(CampaignLauncher::new(Arc::clone(&store)));

    let state = ApiState {
        lifecycle: Arc::clone(&lifecycle),
        launcher,
        store,
        sync_concurrency: config.sync_concurrency,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("HTTP server listening on {}", config.bind_address);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: HTTP Server
    let http_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                http_cancel.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await
            .context("HTTP server error")?;
        Ok(TaskName::HttpServer)
    });

    // Task 2: Enrichment worker (reconciles completed calls off the queue)
    let worker_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[EnrichmentWorker] Task starting");
        run_enrichment_worker(lifecycle, enrichment_rx, worker_cancel).await;
        Ok(TaskName::EnrichmentWorker)
    });

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("outdial shutdown complete");
    Ok(())
}
