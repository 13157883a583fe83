//! rollcall-at - Attendance Tracker service
//!
//! Enrolls students with a facial descriptor, marks subject attendance by
//! face verification, and answers listing, name and threshold queries.
//!
//! Startup: tracing, configuration, root folder, database, record store,
//! index gateways, capture source, then a full reconciliation so every
//! derived artifact matches the store before the first request.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rollcall_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use rollcall_at::gateways::GatewaySet;
use rollcall_at::services::Services;
use rollcall_at::store::RecordStore;
use rollcall_at::sync::IndexSynchronizer;
use rollcall_at::{build_router, capture, db, AppState};

const DEFAULT_FILTER: &str = "rollcall_at=info,rollcall_common=info,tower_http=info";

/// Command-line arguments for rollcall-at
#[derive(Parser, Debug)]
#[command(name = "rollcall-at")]
#[command(about = "Attendance tracker with face verification")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "ROLLCALL_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and index artifacts
    #[arg(short, long, env = "ROLLCALL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; the filter is reloadable so the config file's
    // logging.level can apply once it is read
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting rollcall-at (Attendance Tracker) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    let config = TomlConfig::load();

    if !from_env {
        let level = config.logging.level.to_lowercase();
        let directive = format!(
            "rollcall_at={level},rollcall_common={level},tower_http={level}"
        );
        match EnvFilter::try_new(&directive) {
            Ok(filter) => {
                if let Err(e) = filter_handle.modify(|current| *current = filter) {
                    warn!("Could not apply configured log level: {}", e);
                }
            }
            Err(e) => warn!("Ignoring invalid logging.level {:?}: {}", config.logging.level, e),
        }
    }

    // Step 1: Resolve root folder
    let root_folder = RootFolderResolver::new("attendance-tracker")
        .with_cli_arg(args.root_folder)
        .with_toml(&config)
        .resolve();

    // Step 2: Create root folder layout if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // Step 3: Open or create database, load the record store
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = db::init_database(&db_path)
        .await
        .context("Failed to open database")?;
    let store = Arc::new(
        RecordStore::open(pool)
            .await
            .context("Failed to load record store")?,
    );

    // Step 4: Gateways, capture source, services
    let gateways = GatewaySet::from_config(
        &config.gateways,
        &config.recognition,
        initializer.root_folder(),
        &initializer.artifact_dir(),
    );
    let sync = Arc::new(IndexSynchronizer::new(gateways, config.gateways.timeout()));
    let capture = capture::from_config(&config.capture);
    let services = Services::new(store, sync, capture);

    // Step 5: Build every derived artifact from the store
    services.bootstrap().await;

    let app = build_router(AppState::new(services));

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
