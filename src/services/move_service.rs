//! Move coordinator: applies a "move message to column" intent to the
//! provider first, then mirrors the label delta locally. A provider
//! failure leaves local state untouched; a later incremental sync
//! converges whatever the provider actually applied.

use sqlx::SqlitePool;

use crate::db::{columns, mailboxes, messages};
use crate::error::Result;
use crate::models::message::{
    apply_label_delta, is_read_from_labels, is_starred_from_labels, INBOX_LABEL,
};
use crate::models::Email;
use crate::services::sync_service::SyncEngine;

pub async fn move_to_column(
    pool: &SqlitePool,
    engine: &SyncEngine,
    user_id: i64,
    email_id: i64,
    column_id: i64,
    archive_from_inbox: bool,
) -> Result<Email> {
    let mut email = messages::find_owned(pool, email_id, user_id).await?;
    let column = columns::find_owned(pool, column_id, user_id).await?;
    let mailbox = mailboxes::find_owned(pool, email.mailbox_id, user_id).await?;

    let add: Vec<String> = column.gmail_label.iter().cloned().collect();
    let remove: Vec<String> = if archive_from_inbox {
        vec![INBOX_LABEL.to_string()]
    } else {
        Vec::new()
    };

    // Provider first; the store only changes once the upstream accepted
    // the delta.
    if !add.is_empty() || !remove.is_empty() {
        let token = engine
            .access_token(&mailbox, chrono::Duration::minutes(5))
            .await?;
        engine
            .provider()
            .modify_message_labels(&token, &email.gmail_message_id, &add, &remove)
            .await?;
    }

    email.labels = apply_label_delta(&email.labels, &add, &remove);
    email.is_read = is_read_from_labels(&email.labels);
    email.is_starred = is_starred_from_labels(&email.labels);
    email.column_id = Some(column.id);
    messages::save_user_fields(pool, &email).await?;
    mailboxes::recompute_counters(pool, email.mailbox_id).await?;

    Ok(email)
}
