//! Open Outreach Dispatch Server
//!
//! A headless multi-channel outreach dispatch engine: campaigns cascade
//! across chat, SMS, and voice until the recipient responds, the channels
//! are exhausted, or the recipient opts out.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ordis_core::events::send_intent_channel;
use ordis_core::processors::{
    DispatchLauncher, EscalationScheduler, EventIngestor, HttpChannelGateway, OutboundSender,
};
use ordis_core::segment::DirectorySegmenter;
use ordis_core::store::{CampaignStore, DispatchStore, PgStore, RecipientDirectory};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use tokio::sync::watch;
use state::AppState;

/// Open Outreach Dispatch - headless multi-channel outreach engine
#[derive(Parser, Debug)]
#[command(name = "ordis-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./ordis-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting ordis-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Convert to shared config with separate locks for each section
    let shared_config = loaded_config.into_shared();

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // One Postgres store backs all three ports
    let store = Arc::new(PgStore::new(db_pool.clone()));
    let dispatches: Arc<dyn DispatchStore> = store.clone();
    let campaigns: Arc<dyn CampaignStore> = store.clone();
    let recipients: Arc<dyn RecipientDirectory> = store.clone();

    // Shutdown fan-out for the HTTP server and the background processors
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });
    }

    // Dispatch pipeline: launcher/scheduler emit send intents, the outbound
    // sender consumes them
    let (send_intent_tx, send_intent_rx) = send_intent_channel();

    let gateway = Arc::new(HttpChannelGateway::new(shared_config.providers.clone()));
    let outbound = OutboundSender::new(
        dispatches.clone(),
        campaigns.clone(),
        recipients.clone(),
        gateway,
    );
    let outbound_handle = tokio::spawn(outbound.run(shutdown_rx.clone(), send_intent_rx));

    let scheduler = EscalationScheduler::new(
        dispatches.clone(),
        campaigns.clone(),
        recipients.clone(),
        send_intent_tx.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    // Create application state
    let state = AppState {
        dispatches: dispatches.clone(),
        campaigns: campaigns.clone(),
        launcher: Arc::new(DispatchLauncher::new(
            dispatches.clone(),
            campaigns.clone(),
            recipients.clone(),
            send_intent_tx,
        )),
        ingestor: Arc::new(EventIngestor::new(dispatches)),
        segmenter: Arc::new(DirectorySegmenter::new(recipients)),
        config: shared_config,
    };

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_rx).await;

    // Stop the config reload handler and wait for the processors. The send
    // also covers the early-exit path where the server never started.
    let _ = shutdown_tx.send(true);
    reload_notify.notify_one();
    let _ = tokio::join!(outbound_handle, scheduler_handle);

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
