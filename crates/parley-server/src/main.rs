use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use parley_db::Database;
use parley_gateway::ChatHub;
use parley_push::cleanup::run_cleanup_loop;
use parley_push::{LogOnlyTransport, PushFanout};
use parley_server::config::ServerConfig;
use parley_server::{DEFAULT_LOG_FILTER, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
    }
    let db = Arc::new(Database::open(&config.db_path)?);

    let seeded = db.seed_rooms(config.default_rooms.as_slice())?;
    if seeded > 0 {
        info!("Seeded {} default room(s)", seeded);
    }

    if config.vapid.is_development() {
        warn!("Using the built-in development VAPID keys; set PARLEY_VAPID_PUBLIC_KEY/PARLEY_VAPID_PRIVATE_KEY");
    }
    info!("Push delivery uses the log-only transport; notifications are not sent over the network");
    let push = PushFanout::new(db.clone(), Arc::new(LogOnlyTransport), config.vapid.clone());

    tokio::spawn(run_cleanup_loop(
        db.clone(),
        config.push_cleanup_secs,
        config.push_retention_days,
    ));

    let app = build_router(ChatHub::new(db, push));

    let addr = config.addr()?;
    info!("Parley chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
