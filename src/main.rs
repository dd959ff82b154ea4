use anyhow::Result;
use chrono::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use mailboard::ai::HttpAiClient;
use mailboard::config::Config;
use mailboard::db;
use mailboard::gmail::GmailClient;
use mailboard::routes::{self, AppState};
use mailboard::secretbox::SecretBox;
use mailboard::services::{scheduler, sync_service::SyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mailboard=debug")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    // A crash mid-sync must not wedge the mailbox; apply the watchdog
    // immediately at boot.
    let reset = db::mailboxes::reset_stuck_syncing(&pool, Duration::zero()).await?;
    if reset > 0 {
        tracing::warn!(count = reset, "reset mailboxes left syncing by a previous run");
    }

    let secrets = SecretBox::new(&config.encryption_key);
    let provider = Arc::new(GmailClient::new(&config));
    let ai = Arc::new(HttpAiClient::new(&config));
    let engine = Arc::new(SyncEngine::new(
        pool.clone(),
        provider.clone(),
        secrets.clone(),
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    scheduler::start(pool.clone(), engine.clone(), ai.clone(), shutdown.clone());

    let state = AppState {
        pool,
        config: config.clone(),
        provider,
        ai,
        secrets,
        engine,
    };
    let app = routes::router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(flag: Arc<AtomicBool>) {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
    flag.store(true, Ordering::SeqCst);
}
