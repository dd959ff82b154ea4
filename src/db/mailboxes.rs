use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::models::{Mailbox, SyncStatus};

#[derive(sqlx::FromRow)]
struct MailboxRow {
    id: i64,
    user_id: i64,
    provider: String,
    email: String,
    access_token_enc: String,
    refresh_token_enc: String,
    token_expires_at: Option<DateTime<Utc>>,
    sync_status: String,
    last_sync_at: Option<DateTime<Utc>>,
    last_sync_error: Option<String>,
    history_id: Option<String>,
    total_emails: i64,
    unread_count: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<MailboxRow> for Mailbox {
    fn from(r: MailboxRow) -> Self {
        Mailbox {
            id: r.id,
            user_id: r.user_id,
            provider: r.provider,
            email: r.email,
            access_token_enc: r.access_token_enc,
            refresh_token_enc: r.refresh_token_enc,
            token_expires_at: r.token_expires_at,
            sync_status: SyncStatus::from_str(&r.sync_status),
            last_sync_at: r.last_sync_at,
            last_sync_error: r.last_sync_error,
            history_id: r.history_id,
            total_emails: r.total_emails,
            unread_count: r.unread_count,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

pub async fn create(
    pool: &SqlitePool,
    user_id: i64,
    email: &str,
    access_token_enc: &str,
    refresh_token_enc: &str,
    token_expires_at: Option<DateTime<Utc>>,
) -> Result<Mailbox> {
    let now = Utc::now();
    let email = email.to_lowercase();
    let res = sqlx::query(
        r#"INSERT INTO mailboxes
           (user_id, provider, email, access_token_enc, refresh_token_enc, token_expires_at,
            sync_status, total_emails, unread_count, is_active, created_at, updated_at)
           VALUES (?, 'gmail', ?, ?, ?, ?, 'pending', 0, 0, 1, ?, ?)"#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(access_token_enc)
    .bind(refresh_token_enc)
    .bind(token_expires_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    let res = match res {
        Ok(res) => res,
        Err(e) if is_unique_violation(&e) => {
            return Err(Error::conflict(format!("mailbox {email} is already connected")))
        }
        Err(e) => return Err(e.into()),
    };

    let mailbox = find(pool, res.last_insert_rowid())
        .await?
        .ok_or(Error::NotFound("mailbox"))?;
    Ok(mailbox)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<Mailbox>> {
    let row = sqlx::query_as::<_, MailboxRow>(
        "SELECT * FROM mailboxes WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

/// Ownership-checked lookup; a foreign mailbox is indistinguishable from a
/// missing one.
pub async fn find_owned(pool: &SqlitePool, id: i64, user_id: i64) -> Result<Mailbox> {
    let row = sqlx::query_as::<_, MailboxRow>(
        "SELECT * FROM mailboxes WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.map(Into::into).ok_or(Error::NotFound("mailbox"))
}

pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Mailbox>> {
    let rows = sqlx::query_as::<_, MailboxRow>(
        "SELECT * FROM mailboxes WHERE user_id = ? AND deleted_at IS NULL ORDER BY created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Mailbox>> {
    let rows = sqlx::query_as::<_, MailboxRow>(
        "SELECT * FROM mailboxes WHERE is_active = 1 AND deleted_at IS NULL ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Active mailboxes whose access token expires inside the horizon.
pub async fn list_expiring_tokens(pool: &SqlitePool, horizon: Duration) -> Result<Vec<Mailbox>> {
    let cutoff = Utc::now() + horizon;
    let rows = sqlx::query_as::<_, MailboxRow>(
        r#"SELECT * FROM mailboxes
           WHERE is_active = 1 AND deleted_at IS NULL
             AND token_expires_at IS NOT NULL AND token_expires_at <= ?"#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn set_sync_status(pool: &SqlitePool, id: i64, status: SyncStatus) -> Result<()> {
    sqlx::query("UPDATE mailboxes SET sync_status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_synced(pool: &SqlitePool, id: i64, history_id: Option<&str>) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"UPDATE mailboxes
           SET sync_status = 'synced', last_sync_at = ?, last_sync_error = NULL,
               history_id = COALESCE(?, history_id), updated_at = ?
           WHERE id = ?"#,
    )
    .bind(now)
    .bind(history_id)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_error(pool: &SqlitePool, id: i64, message: &str) -> Result<()> {
    sqlx::query(
        "UPDATE mailboxes SET sync_status = 'error', last_sync_error = ?, updated_at = ? WHERE id = ?",
    )
    .bind(message)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_history_id(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE mailboxes SET history_id = NULL, sync_status = 'pending', updated_at = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persists a freshly-refreshed access token. Re-reads nothing: the write
/// is a single row update keyed on id, and refresh tokens are immutable
/// here, so a concurrent refresh can only race another fresh token.
pub async fn update_access_token(
    pool: &SqlitePool,
    id: i64,
    access_token_enc: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE mailboxes SET access_token_enc = ?, token_expires_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(access_token_enc)
    .bind(expires_at)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Counters are recounted, never incremented, so retried ingestion batches
/// stay correct.
pub async fn recompute_counters(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query(
        r#"UPDATE mailboxes SET
             total_emails = (SELECT COUNT(*) FROM emails WHERE mailbox_id = ? AND deleted_at IS NULL),
             unread_count = (SELECT COUNT(*) FROM emails WHERE mailbox_id = ? AND deleted_at IS NULL AND is_read = 0),
             updated_at = ?
           WHERE id = ?"#,
    )
    .bind(id)
    .bind(id)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn soft_delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE mailboxes SET deleted_at = ?, is_active = 0, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Watchdog: anything stuck in `syncing` longer than the threshold is
/// forced back to `synced` so the next tick can try again.
pub async fn reset_stuck_syncing(pool: &SqlitePool, threshold: Duration) -> Result<u64> {
    let cutoff = Utc::now() - threshold;
    let res = sqlx::query(
        "UPDATE mailboxes SET sync_status = 'synced', updated_at = ? WHERE sync_status = 'syncing' AND updated_at < ?",
    )
    .bind(Utc::now())
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}
