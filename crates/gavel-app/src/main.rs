// Auction server entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config and the player dataset
// 3. Open database, build the store, audit sink and gate
// 4. Restore the previous auction if one was stored
// 5. Spawn WebSocket server, dashboard observer and app loop
// 6. Wait for Ctrl+C, then shut down

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use gavel_app::app::{self, AppCommand};
use gavel_app::observer::{self, DashboardObserver};
use gavel_app::replicator::Replicator;
use gavel_app::ws_server;
use gavel_core::audit::{AuditSink, SqliteAudit};
use gavel_core::config;
use gavel_core::dataset;
use gavel_core::db::Database;
use gavel_core::engine::AuctionEngine;
use gavel_core::gate::{AccessGate, StaticGate};
use gavel_core::store::{SqliteStore, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Auction server starting up");

    // 2. Load config and players
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: auction={}, {} teams, purse {}, categories {:?}",
        config.auction.name,
        config.teams.len(),
        config.auction.purse,
        config.auction.categories
    );
    if config.credentials.uses_default() {
        warn!("No admin account configured; using the built-in default");
    }

    let players = dataset::load_players(std::path::Path::new(&config.auction.players_path))
        .context("failed to load player dataset")?;

    // 3. Database and collaborators
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);
    let store: Arc<dyn StateStore> = Arc::new(SqliteStore::new(db.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(SqliteAudit::new(db));
    let gate: Arc<dyn AccessGate> = Arc::new(StaticGate::new(config.admin_credentials()));

    let engine = AuctionEngine::new(
        players,
        config.team_seeds(),
        config.auction.purse,
        config.auction.categories.clone(),
    );
    let (replicator, replicator_handle) = Replicator::spawn(store.clone(), audit);

    let mut app_state = app::AppState::new(
        config.clone(),
        engine,
        store.clone(),
        gate,
        replicator,
        StdRng::from_entropy(),
    );

    // 4. Crash recovery
    match app::recover_from_store(&mut app_state).await {
        Ok(true) => info!("Auction restored from previous session"),
        Ok(false) => info!("Starting fresh auction"),
        Err(e) => {
            error!("Crash recovery failed: {}", e);
            return Err(e.context("crash recovery failed"));
        }
    }

    // 5. Channels and tasks
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (reply_tx, reply_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (dash_tx, mut dash_rx) = mpsc::channel(16);

    let ws_port = config.ws_port;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(ws_port, ws_tx, reply_rx).await {
            error!("WebSocket server error: {}", e);
        }
    });

    let dashboard = DashboardObserver::new(
        store,
        config.auction.categories.clone(),
        config.auction.low_purse_threshold,
        config.dashboard.poll_interval(),
    );
    let observer_handle = tokio::spawn(dashboard.run(dash_tx));
    let headline_handle = tokio::spawn(async move {
        while let Some(update) = dash_rx.recv().await {
            info!("Dashboard: {}", observer::headline(&update));
        }
    });

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, cmd_rx, reply_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    info!("Auction server ready. WebSocket server listening on 127.0.0.1:{}", ws_port);

    // 6. Wait for Ctrl+C
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Ctrl+C received");
    let _ = cmd_tx.send(AppCommand::Quit).await;

    // The app loop flushes pending replication before it returns.
    let _ = tokio::time::timeout(Duration::from_secs(5), app_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), replicator_handle).await;

    ws_handle.abort();
    observer_handle.abort();
    headline_handle.abort();

    info!("Auction server shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/gavel.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("gavel.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gavel=info,gavel_app=info,gavel_core=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
