//! Snooze wakeups: one batched update per tick for every message whose
//! deadline has passed. Idempotent, so a tick racing a user edit is
//! harmless.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::messages;

pub async fn wake_due(pool: &SqlitePool) {
    match messages::wake_due_snoozes(pool, Utc::now()).await {
        Ok(0) => {}
        Ok(count) => info!(count, "woke snoozed messages"),
        Err(e) => warn!(error = %e, "snooze wake failed"),
    }
}
