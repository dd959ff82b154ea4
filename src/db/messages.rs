use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::gmail::ParsedMessage;
use crate::models::message::{is_read_from_labels, is_starred_from_labels};
use crate::models::{Attachment, Category, Email, TaskStatus};

#[derive(sqlx::FromRow)]
struct EmailRow {
    id: i64,
    mailbox_id: i64,
    gmail_message_id: String,
    gmail_thread_id: String,
    subject: Option<String>,
    snippet: Option<String>,
    from_email: String,
    from_name: Option<String>,
    to_emails: String,
    cc_emails: String,
    bcc_emails: String,
    body_html: Option<String>,
    body_text: Option<String>,
    received_at: DateTime<Utc>,
    is_read: bool,
    is_starred: bool,
    has_attachments: bool,
    labels: String,
    category: String,
    task_status: String,
    task_deadline: Option<DateTime<Utc>>,
    is_pinned: bool,
    is_snoozed: bool,
    snoozed_until: Option<DateTime<Utc>>,
    ai_summary: Option<String>,
    ai_action_items: Option<String>,
    urgency_score: Option<i64>,
    column_id: Option<i64>,
    embedding: Option<Vec<u8>>,
    embedding_generated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

fn parse_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl From<EmailRow> for Email {
    fn from(r: EmailRow) -> Self {
        Email {
            id: r.id,
            mailbox_id: r.mailbox_id,
            gmail_message_id: r.gmail_message_id,
            gmail_thread_id: r.gmail_thread_id,
            subject: r.subject,
            snippet: r.snippet,
            from_email: r.from_email,
            from_name: r.from_name,
            to_emails: parse_list(&r.to_emails),
            cc_emails: parse_list(&r.cc_emails),
            bcc_emails: parse_list(&r.bcc_emails),
            body_html: r.body_html,
            body_text: r.body_text,
            received_at: r.received_at,
            is_read: r.is_read,
            is_starred: r.is_starred,
            has_attachments: r.has_attachments,
            labels: parse_list(&r.labels),
            category: Category::from_str(&r.category),
            task_status: TaskStatus::parse(&r.task_status).unwrap_or(TaskStatus::None),
            task_deadline: r.task_deadline,
            is_pinned: r.is_pinned,
            is_snoozed: r.is_snoozed,
            snoozed_until: r.snoozed_until,
            ai_summary: r.ai_summary,
            ai_action_items: r.ai_action_items.and_then(|s| serde_json::from_str(&s).ok()),
            urgency_score: r.urgency_score,
            column_id: r.column_id,
            embedding: r.embedding.as_deref().map(decode_embedding),
            embedding_generated_at: r.embedding_generated_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn decode_embedding(raw: &[u8]) -> Vec<f32> {
    raw.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub struct UpsertOutcome {
    pub email_id: i64,
    pub created: bool,
}

/// Ingests one parsed provider message: update in place when the row
/// exists, otherwise insert it together with its attachments. Derived
/// fields are recomputed from the label set on both paths.
pub async fn upsert_parsed(
    pool: &SqlitePool,
    mailbox_id: i64,
    msg: &ParsedMessage,
) -> Result<UpsertOutcome> {
    let now = Utc::now();
    let labels_json = serde_json::to_string(&msg.labels).map_err(anyhow::Error::from)?;
    let is_read = is_read_from_labels(&msg.labels);
    let is_starred = is_starred_from_labels(&msg.labels);
    let category = Category::from_labels(&msg.labels);
    let has_attachments = !msg.attachments.is_empty();

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM emails WHERE mailbox_id = ? AND gmail_message_id = ? AND deleted_at IS NULL",
    )
    .bind(mailbox_id)
    .bind(&msg.gmail_message_id)
    .fetch_optional(pool)
    .await?;

    if let Some(email_id) = existing {
        sqlx::query(
            r#"UPDATE emails SET
                 gmail_thread_id = ?, subject = ?, snippet = ?, from_email = ?, from_name = ?,
                 to_emails = ?, cc_emails = ?, bcc_emails = ?, body_html = ?, body_text = ?,
                 received_at = ?, is_read = ?, is_starred = ?, has_attachments = ?,
                 labels = ?, category = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&msg.gmail_thread_id)
        .bind(&msg.subject)
        .bind(&msg.snippet)
        .bind(&msg.from_email)
        .bind(&msg.from_name)
        .bind(serde_json::to_string(&msg.to_emails).map_err(anyhow::Error::from)?)
        .bind(serde_json::to_string(&msg.cc_emails).map_err(anyhow::Error::from)?)
        .bind(serde_json::to_string(&msg.bcc_emails).map_err(anyhow::Error::from)?)
        .bind(&msg.body_html)
        .bind(&msg.body_text)
        .bind(msg.received_at)
        .bind(is_read)
        .bind(is_starred)
        .bind(has_attachments)
        .bind(&labels_json)
        .bind(category.as_str())
        .bind(now)
        .bind(email_id)
        .execute(pool)
        .await?;

        return Ok(UpsertOutcome {
            email_id,
            created: false,
        });
    }

    let mut tx = pool.begin().await?;
    let res = sqlx::query(
        r#"INSERT INTO emails
             (mailbox_id, gmail_message_id, gmail_thread_id, subject, snippet,
              from_email, from_name, to_emails, cc_emails, bcc_emails,
              body_html, body_text, received_at, is_read, is_starred,
              has_attachments, labels, category, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(mailbox_id)
    .bind(&msg.gmail_message_id)
    .bind(&msg.gmail_thread_id)
    .bind(&msg.subject)
    .bind(&msg.snippet)
    .bind(&msg.from_email)
    .bind(&msg.from_name)
    .bind(serde_json::to_string(&msg.to_emails).map_err(anyhow::Error::from)?)
    .bind(serde_json::to_string(&msg.cc_emails).map_err(anyhow::Error::from)?)
    .bind(serde_json::to_string(&msg.bcc_emails).map_err(anyhow::Error::from)?)
    .bind(&msg.body_html)
    .bind(&msg.body_text)
    .bind(msg.received_at)
    .bind(is_read)
    .bind(is_starred)
    .bind(has_attachments)
    .bind(&labels_json)
    .bind(category.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    let email_id = res.last_insert_rowid();

    if has_attachments {
        let mut sql = String::from(
            "INSERT INTO attachments (email_id, gmail_attachment_id, filename, mime_type, size, content_id, is_inline, created_at) VALUES ",
        );
        sql.push_str(
            &msg.attachments
                .iter()
                .map(|_| "(?, ?, ?, ?, ?, ?, ?, ?)")
                .collect::<Vec<_>>()
                .join(", "),
        );
        let mut q = sqlx::query(&sql);
        for att in &msg.attachments {
            q = q
                .bind(email_id)
                .bind(&att.gmail_attachment_id)
                .bind(&att.filename)
                .bind(&att.mime_type)
                .bind(att.size)
                .bind(&att.content_id)
                .bind(att.is_inline)
                .bind(now);
        }
        q.execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(UpsertOutcome {
        email_id,
        created: true,
    })
}

/// Batch soft delete by provider ids; absent ids are ignored.
pub async fn soft_delete_by_gmail_ids(
    pool: &SqlitePool,
    mailbox_id: i64,
    gmail_ids: &[String],
) -> Result<u64> {
    if gmail_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = gmail_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "UPDATE emails SET deleted_at = ?, updated_at = ? WHERE mailbox_id = ? AND deleted_at IS NULL AND gmail_message_id IN ({placeholders})",
    );
    let now = Utc::now();
    let mut q = sqlx::query(&sql).bind(now).bind(now).bind(mailbox_id);
    for id in gmail_ids {
        q = q.bind(id);
    }
    let res = q.execute(pool).await?;
    Ok(res.rows_affected())
}

pub async fn find_by_gmail_id(
    pool: &SqlitePool,
    mailbox_id: i64,
    gmail_message_id: &str,
) -> Result<Option<Email>> {
    let row = sqlx::query_as::<_, EmailRow>(
        "SELECT * FROM emails WHERE mailbox_id = ? AND gmail_message_id = ? AND deleted_at IS NULL",
    )
    .bind(mailbox_id)
    .bind(gmail_message_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<Email>> {
    let row =
        sqlx::query_as::<_, EmailRow>("SELECT * FROM emails WHERE id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(Into::into))
}

pub async fn find_owned(pool: &SqlitePool, id: i64, user_id: i64) -> Result<Email> {
    let row = sqlx::query_as::<_, EmailRow>(
        r#"SELECT e.* FROM emails e
           JOIN mailboxes m ON m.id = e.mailbox_id
           WHERE e.id = ? AND m.user_id = ? AND e.deleted_at IS NULL AND m.deleted_at IS NULL"#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.map(Into::into).ok_or(Error::NotFound("email"))
}

/// Persists the user-editable and label-derived fields of an already
/// loaded row. Writers mutate the struct, then call this.
pub async fn save_user_fields(pool: &SqlitePool, email: &Email) -> Result<()> {
    sqlx::query(
        r#"UPDATE emails SET
             labels = ?, is_read = ?, is_starred = ?, is_pinned = ?,
             task_status = ?, task_deadline = ?, is_snoozed = ?, snoozed_until = ?,
             column_id = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(serde_json::to_string(&email.labels).map_err(anyhow::Error::from)?)
    .bind(email.is_read)
    .bind(email.is_starred)
    .bind(email.is_pinned)
    .bind(email.task_status.as_str())
    .bind(email.task_deadline)
    .bind(email.is_snoozed)
    .bind(email.snoozed_until)
    .bind(email.column_id)
    .bind(Utc::now())
    .bind(email.id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn soft_delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let now = Utc::now();
    sqlx::query("UPDATE emails SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn attachments_for(pool: &SqlitePool, email_id: i64) -> Result<Vec<Attachment>> {
    let rows = sqlx::query_as::<_, Attachment>(
        "SELECT * FROM attachments WHERE email_id = ? ORDER BY id ASC",
    )
    .bind(email_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Ownership-checked attachment lookup; also returns the owning mailbox id
/// and provider message id needed to fetch the bytes upstream.
pub async fn attachment_owned(
    pool: &SqlitePool,
    attachment_id: i64,
    user_id: i64,
) -> Result<(Attachment, i64, String)> {
    let row = sqlx::query(
        r#"SELECT a.id, a.email_id, a.gmail_attachment_id, a.filename, a.mime_type, a.size,
                  a.content_id, a.is_inline, a.created_at,
                  e.mailbox_id, e.gmail_message_id
           FROM attachments a
           JOIN emails e ON e.id = a.email_id
           JOIN mailboxes m ON m.id = e.mailbox_id
           WHERE a.id = ? AND m.user_id = ? AND e.deleted_at IS NULL AND m.deleted_at IS NULL"#,
    )
    .bind(attachment_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(Error::NotFound("attachment"))?;

    let attachment = Attachment {
        id: row.try_get("id")?,
        email_id: row.try_get("email_id")?,
        gmail_attachment_id: row.try_get("gmail_attachment_id")?,
        filename: row.try_get("filename")?,
        mime_type: row.try_get("mime_type")?,
        size: row.try_get("size")?,
        content_id: row.try_get("content_id")?,
        is_inline: row.try_get("is_inline")?,
        created_at: row.try_get("created_at")?,
    };
    let mailbox_id: i64 = row.try_get("mailbox_id")?;
    let gmail_message_id: String = row.try_get("gmail_message_id")?;
    Ok((attachment, mailbox_id, gmail_message_id))
}

#[derive(Debug, Default, Clone)]
pub struct EmailFilter {
    pub mailbox_id: Option<i64>,
    pub search: Option<String>,
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub has_attachments: Option<bool>,
    pub category: Option<Category>,
    pub task_status: Option<TaskStatus>,
    pub from_email: Option<String>,
    pub label: Option<String>,
    pub exclude_label: Option<String>,
    pub is_snoozed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSort {
    ReceivedAt,
    Subject,
    FromEmail,
}

impl EmailSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "receivedAt" => Some(Self::ReceivedAt),
            "subject" => Some(Self::Subject),
            "fromEmail" => Some(Self::FromEmail),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::ReceivedAt => "e.received_at",
            Self::Subject => "e.subject",
            Self::FromEmail => "e.from_email",
        }
    }
}

fn filter_clauses(filter: &EmailFilter) -> (String, Vec<String>) {
    let mut clauses =
        vec!["m.user_id = ?".to_string(), "e.deleted_at IS NULL".into(), "m.deleted_at IS NULL".into()];
    let mut binds: Vec<String> = Vec::new();

    if let Some(id) = filter.mailbox_id {
        clauses.push("e.mailbox_id = ?".into());
        binds.push(id.to_string());
    }
    if let Some(search) = &filter.search {
        clauses.push("(e.subject LIKE ? OR e.snippet LIKE ? OR e.from_email LIKE ? OR e.from_name LIKE ?)".into());
        let pat = format!("%{search}%");
        binds.extend([pat.clone(), pat.clone(), pat.clone(), pat]);
    }
    if let Some(v) = filter.is_read {
        clauses.push("e.is_read = ?".into());
        binds.push((v as i64).to_string());
    }
    if let Some(v) = filter.is_starred {
        clauses.push("e.is_starred = ?".into());
        binds.push((v as i64).to_string());
    }
    if let Some(v) = filter.has_attachments {
        clauses.push("e.has_attachments = ?".into());
        binds.push((v as i64).to_string());
    }
    if let Some(c) = filter.category {
        clauses.push("e.category = ?".into());
        binds.push(c.as_str().to_string());
    }
    if let Some(t) = filter.task_status {
        clauses.push("e.task_status = ?".into());
        binds.push(t.as_str().to_string());
    }
    if let Some(from) = &filter.from_email {
        clauses.push("e.from_email = ?".into());
        binds.push(from.clone());
    }
    if let Some(label) = &filter.label {
        clauses.push("e.labels LIKE ?".into());
        binds.push(format!("%\"{label}\"%"));
    }
    if let Some(label) = &filter.exclude_label {
        clauses.push("e.labels NOT LIKE ?".into());
        binds.push(format!("%\"{label}\"%"));
    }
    if let Some(v) = filter.is_snoozed {
        clauses.push("e.is_snoozed = ?".into());
        binds.push((v as i64).to_string());
    }

    (clauses.join(" AND "), binds)
}

pub async fn list_filtered(
    pool: &SqlitePool,
    user_id: i64,
    filter: &EmailFilter,
    sort: EmailSort,
    descending: bool,
    page: i64,
    limit: i64,
) -> Result<(Vec<Email>, i64)> {
    let (where_sql, binds) = filter_clauses(filter);
    let order = if descending { "DESC" } else { "ASC" };

    let count_sql = format!(
        "SELECT COUNT(*) FROM emails e JOIN mailboxes m ON m.id = e.mailbox_id WHERE {where_sql}",
    );
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);
    for b in &binds {
        count_q = count_q.bind(b);
    }
    let total = count_q.fetch_one(pool).await?;

    let list_sql = format!(
        r#"SELECT e.* FROM emails e JOIN mailboxes m ON m.id = e.mailbox_id
           WHERE {where_sql}
           ORDER BY {} {order}, e.id ASC
           LIMIT ? OFFSET ?"#,
        sort.column(),
    );
    let mut list_q = sqlx::query_as::<_, EmailRow>(&list_sql).bind(user_id);
    for b in &binds {
        list_q = list_q.bind(b);
    }
    let rows = list_q
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(pool)
        .await?;

    Ok((rows.into_iter().map(Into::into).collect(), total))
}

/// All of a user's live rows, optionally narrowed to one mailbox. The
/// search service scores these in memory.
pub async fn search_candidates(
    pool: &SqlitePool,
    user_id: i64,
    mailbox_id: Option<i64>,
) -> Result<Vec<Email>> {
    let mut sql = String::from(
        r#"SELECT e.* FROM emails e JOIN mailboxes m ON m.id = e.mailbox_id
           WHERE m.user_id = ? AND e.deleted_at IS NULL AND m.deleted_at IS NULL"#,
    );
    if mailbox_id.is_some() {
        sql.push_str(" AND e.mailbox_id = ?");
    }
    sql.push_str(" ORDER BY e.received_at DESC");

    let mut q = sqlx::query_as::<_, EmailRow>(&sql).bind(user_id);
    if let Some(id) = mailbox_id {
        q = q.bind(id);
    }
    let rows = q.fetch_all(pool).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// One batched wake for every snooze whose deadline has passed.
pub async fn wake_due_snoozes(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query(
        r#"UPDATE emails SET is_snoozed = 0, snoozed_until = NULL, updated_at = ?
           WHERE is_snoozed = 1 AND snoozed_until IS NOT NULL AND snoozed_until <= ?"#,
    )
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn embedding_candidates(
    pool: &SqlitePool,
    mailbox_id: i64,
    limit: i64,
) -> Result<Vec<Email>> {
    let rows = sqlx::query_as::<_, EmailRow>(
        r#"SELECT * FROM emails
           WHERE mailbox_id = ? AND deleted_at IS NULL AND embedding IS NULL
           ORDER BY received_at DESC LIMIT ?"#,
    )
    .bind(mailbox_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn set_embedding(pool: &SqlitePool, email_id: i64, vector: &[f32]) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE emails SET embedding = ?, embedding_generated_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(encode_embedding(vector))
    .bind(now)
    .bind(now)
    .bind(email_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_ai_summary(pool: &SqlitePool, email_id: i64, summary: &str) -> Result<()> {
    sqlx::query("UPDATE emails SET ai_summary = ?, updated_at = ? WHERE id = ?")
        .bind(summary)
        .bind(Utc::now())
        .bind(email_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Per-system-label totals for the mailbox stats endpoint.
pub async fn label_stats(pool: &SqlitePool, mailbox_id: i64, label: &str) -> Result<(i64, i64)> {
    let pattern = format!("%\"{label}\"%");
    let row: SqliteRow = sqlx::query(
        r#"SELECT COUNT(*) AS total,
                  COALESCE(SUM(CASE WHEN is_read = 0 THEN 1 ELSE 0 END), 0) AS unread
           FROM emails
           WHERE mailbox_id = ? AND deleted_at IS NULL AND labels LIKE ?"#,
    )
    .bind(mailbox_id)
    .bind(pattern)
    .fetch_one(pool)
    .await?;
    Ok((row.try_get("total")?, row.try_get("unread")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.75, 0.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }

    #[test]
    fn embedding_decode_ignores_trailing_bytes() {
        let mut raw = encode_embedding(&[1.0f32]);
        raw.push(0xFF);
        assert_eq!(decode_embedding(&raw), vec![1.0f32]);
    }
}
