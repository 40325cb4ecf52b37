//! guildwatch -- raid watchdog for chat guilds.
//!
//! This crate provides the core library for burst detection over
//! administrative events, member quarantine with role backup/restore,
//! and channel topology snapshots with best-effort structural recovery.

pub mod api;
pub mod backup;
pub mod commands;
pub mod config;
pub mod detect;
pub mod platform;
pub mod quarantine;
pub mod response;
pub mod storage;
pub mod watchdog;

use anyhow::Result;
use std::sync::Arc;

/// Start the watchdog daemon: storage, platform client, periodic
/// snapshot sweep, and the event/command ingest server.
pub async fn serve(config_path: &std::path::Path, bind: &str, db_path: &str) -> Result<()> {
    // 1. Configuration -- missing identity fields are the only fatal case
    let cfg = Arc::new(config::WatchdogConfig::load(config_path)?);

    // 2. Storage
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(db_path)?;

    // 3. Platform client (resolves own identity, fails fast on bad creds)
    let platform = platform::rest::RestPlatform::connect(&cfg.api_base, &cfg.bot_token).await?;
    let platform: Arc<dyn platform::ChatPlatform> = Arc::new(platform);

    // 4. Watchdog engine
    let watchdog = Arc::new(watchdog::Watchdog::new(cfg, platform, pool));

    // 5. Periodic snapshot sweep (background task)
    let sweep_backup = watchdog.backup().clone();
    tokio::spawn(async move {
        backup::run_snapshot_loop(sweep_backup).await;
    });

    // 6. Ingest server
    let addr: std::net::SocketAddr = bind.parse()?;
    let app = api::router(api::state::AppState { watchdog });

    tracing::info!(%addr, "guildwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
