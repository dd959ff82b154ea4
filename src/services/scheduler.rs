//! Timer-driven background work. Every loop consults the shutdown flag at
//! the top of its tick: in-flight work completes, no new work starts.
//! Cross-timer locking is unnecessary because the sync engine's guard
//! serializes the only mutually-exclusive work.

use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::ai::AiProvider;
use crate::services::{enrichment_service, snooze_service, sync_service::SyncEngine};

const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const INCREMENTAL_SYNC_INTERVAL: Duration = Duration::from_secs(180);
const RETRY_SCAN_INTERVAL: Duration = Duration::from_secs(30);
const SNOOZE_WAKE_INTERVAL: Duration = Duration::from_secs(60);
const ENRICHMENT_INTERVAL: Duration = Duration::from_secs(600);
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(86_400);
const MAINTENANCE_INITIAL_DELAY: Duration = Duration::from_secs(60);

pub fn start(
    pool: SqlitePool,
    engine: Arc<SyncEngine>,
    ai: Arc<dyn AiProvider>,
    shutdown: Arc<AtomicBool>,
) {
    {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(run_loop(TOKEN_REFRESH_INTERVAL, shutdown, move || {
            let engine = engine.clone();
            async move { engine.refresh_expiring_tokens().await }
        }));
    }

    {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(run_loop(INCREMENTAL_SYNC_INTERVAL, shutdown, move || {
            let engine = engine.clone();
            async move { engine.incremental_tick().await }
        }));
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(run_loop(RETRY_SCAN_INTERVAL, shutdown, move || {
            let engine = engine.clone();
            async move { engine.run_due_retries().await }
        }));
    }

    {
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(run_loop(SNOOZE_WAKE_INTERVAL, shutdown, move || {
            let pool = pool.clone();
            async move { snooze_service::wake_due(&pool).await }
        }));
    }

    {
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(run_loop(ENRICHMENT_INTERVAL, shutdown, move || {
            let pool = pool.clone();
            let ai = ai.clone();
            async move { enrichment_service::run_tick(&pool, ai.as_ref()).await }
        }));
    }

    tokio::spawn(async move {
        tokio::time::sleep(MAINTENANCE_INITIAL_DELAY).await;
        run_loop(MAINTENANCE_INTERVAL, shutdown, move || {
            let pool = pool.clone();
            async move {
                if let Err(e) = perform_maintenance(&pool).await {
                    tracing::error!(error = %e, "maintenance job failed");
                }
            }
        })
        .await;
    });
}

async fn run_loop<F, Fut>(interval: Duration, shutdown: Arc<AtomicBool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        tick().await;
        tokio::time::sleep(interval).await;
    }
}

async fn perform_maintenance(pool: &SqlitePool) -> anyhow::Result<()> {
    info!("running store maintenance");
    sqlx::query("PRAGMA optimize").execute(pool).await?;
    sqlx::query("ANALYZE").execute(pool).await?;
    Ok(())
}
