//! Background embedding catch-up: per active mailbox, embed the newest
//! messages that still lack a vector. Per-message failures are logged and
//! skipped so one bad row never stalls the batch.

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::ai::{embedding_input, AiProvider};
use crate::db::{mailboxes, messages};
use crate::error::Result;
use crate::models::Email;

pub const DEFAULT_BATCH_SIZE: i64 = 50;

pub async fn run_tick(pool: &SqlitePool, ai: &dyn AiProvider) {
    let active = match mailboxes::list_active(pool).await {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "enrichment mailbox scan failed");
            return;
        }
    };
    for mailbox in active {
        match generate_for_mailbox(pool, ai, mailbox.id, DEFAULT_BATCH_SIZE).await {
            Ok(0) => {}
            Ok(count) => info!(mailbox_id = mailbox.id, count, "generated embeddings"),
            Err(e) => warn!(mailbox_id = mailbox.id, error = %e, "enrichment batch failed"),
        }
    }
}

/// Embeds up to `limit` of the mailbox's newest unembedded messages.
/// Returns how many vectors were stored.
pub async fn generate_for_mailbox(
    pool: &SqlitePool,
    ai: &dyn AiProvider,
    mailbox_id: i64,
    limit: i64,
) -> Result<usize> {
    let candidates = messages::embedding_candidates(pool, mailbox_id, limit).await?;
    let mut generated = 0;
    for email in &candidates {
        match generate_for_email(pool, ai, email).await {
            Ok(()) => generated += 1,
            Err(e) => {
                warn!(mailbox_id, email_id = email.id, error = %e, "embedding generation failed");
            }
        }
    }
    Ok(generated)
}

pub async fn generate_for_email(pool: &SqlitePool, ai: &dyn AiProvider, email: &Email) -> Result<()> {
    let input = embedding_input(
        email.subject.as_deref(),
        email.from_name.as_deref(),
        &email.from_email,
        email.body_text.as_deref(),
    );
    let vector = ai.embed(&input).await?;
    messages::set_embedding(pool, email.id, &vector).await?;
    debug!(email_id = email.id, "embedding stored");
    Ok(())
}
