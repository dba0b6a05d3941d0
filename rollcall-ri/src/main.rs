//! rollcall-ri - Representative Index service
//!
//! Ingests representative records from the configured providers, keeps one
//! canonical person per real person, and answers address lookups over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rollcall_common::config::{self, TomlConfig};
use rollcall_common::events::EventBus;
use rollcall_ri::adapters::AdapterRegistry;
use rollcall_ri::geo::{AddressHasher, GeocodingLayer};
use rollcall_ri::ingest::IngestPipeline;
use rollcall_ri::scheduler::RateLimitedScheduler;
use rollcall_ri::AppState;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rollcall-ri
#[derive(Parser, Debug)]
#[command(name = "rollcall-ri")]
#[command(about = "Representative Index service")]
#[command(version)]
struct Args {
    /// Bootstrap TOML configuration file
    #[arg(short, long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides TOML)
    #[arg(short, long, env = "ROLLCALL_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    // Parsed before logging starts so the TOML level can seed the filter
    let toml_result = config::load_toml_config(&config_path);
    let log_level = toml_result
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rollcall_ri={0},rollcall_common={0},tower_http=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let toml_config: TomlConfig = toml_result
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    info!("Starting rollcall-ri (Representative Index)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config::database_path(&root_folder);
    let db = rollcall_ri::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let api_keys = rollcall_ri::config::resolve_provider_api_keys(&db, &toml_config.providers).await?;
    let registry = AdapterRegistry::from_config(&toml_config.providers, &api_keys)
        .context("Failed to build provider adapters")?;
    if registry.is_empty() {
        warn!("No providers configured; ingestion cycles will be empty");
    } else {
        info!("Providers: {}", registry.names().join(", "));
    }

    let scheduler = Arc::new(RateLimitedScheduler::from_config(
        &toml_config.providers,
        &toml_config.retry,
    ));

    let salt = rollcall_ri::config::resolve_salt(&db, &toml_config.privacy).await?;
    let geo = GeocodingLayer::from_config(&toml_config.geocoder, AddressHasher::new(salt))
        .context("Failed to build geocoder")?;
    if toml_config.geocoder.url.is_none() {
        warn!("No geocoder URL configured; lookups resolve to state-only precision");
    }

    let event_bus = EventBus::new(256);
    let state = AppState::new(db, event_bus, registry, scheduler, geo, &toml_config);
    state.pipeline.restore_health().await?;

    let shutdown = CancellationToken::new();
    let ingest_task = (toml_config.ingest.interval_secs > 0).then(|| {
        tokio::spawn(run_periodic_ingest(
            state.clone(),
            Duration::from_secs(toml_config.ingest.interval_secs),
            shutdown.clone(),
        ))
    });

    let app = rollcall_ri::build_router(state).layer(TraceLayer::new_for_http());

    let port = args.port.unwrap_or(toml_config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    if let Some(task) = ingest_task {
        if let Err(e) = task.await {
            warn!("Ingestion task ended abnormally: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Run ingestion cycles until cancelled
///
/// The first cycle starts immediately. A cycle already running (e.g. one
/// triggered over HTTP) is skipped, not queued.
async fn run_periodic_ingest(state: AppState, interval: Duration, cancel: CancellationToken) {
    let pipeline: Arc<IngestPipeline> = state.pipeline.clone();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Periodic ingestion stopped");
                break;
            }
            _ = ticker.tick() => {
                match pipeline.run_cycle().await {
                    Ok(report) => info!(
                        cycle_id = %report.cycle_id,
                        records = report.records,
                        reconciled = report.reconciled,
                        "Periodic ingestion cycle finished"
                    ),
                    Err(rollcall_common::Error::Conflict(_)) => {
                        info!("Ingestion cycle already running, skipping tick");
                    }
                    Err(e) => {
                        error!("Periodic ingestion cycle failed: {}", e);
                        state.set_last_error(format!("Ingestion cycle failed: {}", e)).await;
                    }
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
