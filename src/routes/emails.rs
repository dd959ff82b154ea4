use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::{page_bounds, paginate, AppState, Paginated};
use crate::auth::AuthUser;
use crate::db::messages::{EmailFilter, EmailSort};
use crate::db::{mailboxes, messages};
use crate::error::{Error, Result};
use crate::gmail::OutgoingMessage;
use crate::models::message::{
    is_read_from_labels, is_starred_from_labels, STARRED_LABEL, UNREAD_LABEL,
};
use crate::models::{Attachment, Category, Email, TaskStatus};
use crate::services::{enrichment_service, move_service};

/// Summary projection: the listing view without bodies or recipients.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub id: i64,
    pub mailbox_id: i64,
    pub gmail_thread_id: String,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub from_email: String,
    pub from_name: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_starred: bool,
    pub has_attachments: bool,
    pub labels: Vec<String>,
    pub category: Category,
    pub task_status: TaskStatus,
    pub task_deadline: Option<DateTime<Utc>>,
    pub is_pinned: bool,
    pub is_snoozed: bool,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub ai_summary: Option<String>,
    pub urgency_score: Option<i64>,
    pub column_id: Option<i64>,
}

impl From<&Email> for EmailSummary {
    fn from(e: &Email) -> Self {
        EmailSummary {
            id: e.id,
            mailbox_id: e.mailbox_id,
            gmail_thread_id: e.gmail_thread_id.clone(),
            subject: e.subject.clone(),
            snippet: e.snippet.clone(),
            from_email: e.from_email.clone(),
            from_name: e.from_name.clone(),
            received_at: e.received_at,
            is_read: e.is_read,
            is_starred: e.is_starred,
            has_attachments: e.has_attachments,
            labels: e.labels.clone(),
            category: e.category,
            task_status: e.task_status,
            task_deadline: e.task_deadline,
            is_pinned: e.is_pinned,
            is_snoozed: e.is_snoozed,
            snoozed_until: e.snoozed_until,
            ai_summary: e.ai_summary.clone(),
            urgency_score: e.urgency_score,
            column_id: e.column_id,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDetail {
    #[serde(flatten)]
    pub email: Email,
    pub attachments: Vec<Attachment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailListQuery {
    pub mailbox_id: Option<i64>,
    pub search: Option<String>,
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub has_attachments: Option<bool>,
    pub category: Option<String>,
    pub task_status: Option<String>,
    pub from_email: Option<String>,
    pub label: Option<String>,
    pub exclude_label: Option<String>,
    pub is_snoozed: Option<bool>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<EmailListQuery>,
) -> Result<Json<Paginated<EmailSummary>>> {
    let (page, limit) = page_bounds(query.page, query.limit)?;

    let category = match query.category.as_deref() {
        None => None,
        Some(raw) => match raw {
            "primary" | "social" | "promotions" | "updates" | "forums" => {
                Some(Category::from_str(raw))
            }
            _ => return Err(Error::validation(format!("unknown category: {raw}"))),
        },
    };
    let task_status = match query.task_status.as_deref() {
        None => None,
        Some(raw) => Some(
            TaskStatus::parse(raw)
                .ok_or_else(|| Error::validation(format!("unknown taskStatus: {raw}")))?,
        ),
    };
    let sort = match query.sort_by.as_deref() {
        None => EmailSort::ReceivedAt,
        Some(raw) => EmailSort::parse(raw)
            .ok_or_else(|| Error::validation(format!("unknown sortBy: {raw}")))?,
    };
    let descending = match query.sort_order.as_deref() {
        None => true,
        Some("DESC") | Some("desc") => true,
        Some("ASC") | Some("asc") => false,
        Some(raw) => return Err(Error::validation(format!("unknown sortOrder: {raw}"))),
    };

    let filter = EmailFilter {
        mailbox_id: query.mailbox_id,
        search: query.search.clone().filter(|s| !s.trim().is_empty()),
        is_read: query.is_read,
        is_starred: query.is_starred,
        has_attachments: query.has_attachments,
        category,
        task_status,
        from_email: query.from_email.clone(),
        label: query.label.clone(),
        exclude_label: query.exclude_label.clone(),
        is_snoozed: query.is_snoozed,
    };

    let (emails, total) =
        messages::list_filtered(&state.pool, user_id, &filter, sort, descending, page, limit)
            .await?;
    let data = emails.iter().map(EmailSummary::from).collect();
    Ok(Json(paginate(data, total, page, limit, "/v1/emails")))
}

pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<EmailDetail>> {
    let email = messages::find_owned(&state.pool, id, user_id).await?;
    let attachments = messages::attachments_for(&state.pool, email.id).await?;
    Ok(Json(EmailDetail { email, attachments }))
}

/// Distinguishes "field absent" from "field set to null".
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailPatch {
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub is_pinned: Option<bool>,
    pub task_status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub task_deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub snoozed_until: Option<Option<DateTime<Utc>>>,
}

pub async fn patch_one(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<EmailPatch>,
) -> Result<Json<EmailSummary>> {
    let mut email = messages::find_owned(&state.pool, id, user_id).await?;
    let read_before = email.is_read;

    // Read and starred state live in the label set; mutate that and let
    // the derived flags follow.
    if let Some(is_read) = patch.is_read {
        if is_read {
            email.labels.retain(|l| l != UNREAD_LABEL);
        } else if !email.labels.iter().any(|l| l == UNREAD_LABEL) {
            email.labels.push(UNREAD_LABEL.to_string());
        }
    }
    if let Some(is_starred) = patch.is_starred {
        if is_starred {
            if !email.labels.iter().any(|l| l == STARRED_LABEL) {
                email.labels.push(STARRED_LABEL.to_string());
            }
        } else {
            email.labels.retain(|l| l != STARRED_LABEL);
        }
    }
    email.is_read = is_read_from_labels(&email.labels);
    email.is_starred = is_starred_from_labels(&email.labels);

    if let Some(is_pinned) = patch.is_pinned {
        email.is_pinned = is_pinned;
    }
    if let Some(raw) = &patch.task_status {
        email.task_status = TaskStatus::parse(raw)
            .ok_or_else(|| Error::validation(format!("unknown taskStatus: {raw}")))?;
    }
    if let Some(deadline) = patch.task_deadline {
        email.task_deadline = deadline;
    }
    if let Some(snoozed_until) = patch.snoozed_until {
        match snoozed_until {
            Some(until) => {
                email.is_snoozed = until > Utc::now();
                email.snoozed_until = Some(until);
            }
            None => {
                email.is_snoozed = false;
                email.snoozed_until = None;
            }
        }
    }

    messages::save_user_fields(&state.pool, &email).await?;
    if email.is_read != read_before {
        mailboxes::recompute_counters(&state.pool, email.mailbox_id).await?;
    }
    Ok(Json(EmailSummary::from(&email)))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let email = messages::find_owned(&state.pool, id, user_id).await?;
    messages::soft_delete(&state.pool, email.id).await?;
    mailboxes::recompute_counters(&state.pool, email.mailbox_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub mailbox_id: i64,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub body_html: Option<String>,
    pub in_reply_to: Option<String>,
    pub thread_id: Option<String>,
}

pub async fn send(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SendRequest>,
) -> Result<Json<Value>> {
    let mailbox = mailboxes::find_owned(&state.pool, body.mailbox_id, user_id).await?;
    let token = state
        .engine
        .access_token(&mailbox, Duration::minutes(5))
        .await?;

    let draft = OutgoingMessage {
        from: mailbox.email.clone(),
        to: body.to,
        cc: body.cc,
        bcc: body.bcc,
        subject: body.subject,
        body_text: body.body,
        body_html: body.body_html,
        in_reply_to: body.in_reply_to,
        references: None,
        thread_id: body.thread_id,
    };
    let message_id = state.provider.send_email(&token, &draft).await?;
    Ok(Json(json!({ "messageId": message_id })))
}

pub async fn summarize(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let email = messages::find_owned(&state.pool, id, user_id).await?;
    let text = email
        .body_text
        .as_deref()
        .or(email.snippet.as_deref())
        .or(email.subject.as_deref())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(Error::validation("email has no content to summarize"));
    }

    let summary = state.ai.summarize(text).await?;
    messages::set_ai_summary(&state.pool, email.id, &summary).await?;
    Ok(Json(json!({
        "emailId": email.id,
        "summary": summary,
        "saved": true,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub column_id: i64,
    #[serde(default)]
    pub archive_from_inbox: bool,
}

pub async fn move_to_column(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<MoveRequest>,
) -> Result<Json<EmailSummary>> {
    let email = move_service::move_to_column(
        &state.pool,
        &state.engine,
        user_id,
        id,
        body.column_id,
        body.archive_from_inbox,
    )
    .await?;
    Ok(Json(EmailSummary::from(&email)))
}

pub async fn generate_embedding(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let email = messages::find_owned(&state.pool, id, user_id).await?;
    enrichment_service::generate_for_email(&state.pool, state.ai.as_ref(), &email).await?;
    Ok(Json(json!({ "emailId": email.id, "generated": true })))
}

#[derive(Deserialize)]
pub struct GenerateEmbeddingsQuery {
    pub limit: Option<i64>,
}

pub async fn generate_embeddings(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<GenerateEmbeddingsQuery>,
) -> Result<Json<Value>> {
    let limit = query
        .limit
        .unwrap_or(enrichment_service::DEFAULT_BATCH_SIZE);
    if limit < 1 {
        return Err(Error::validation("limit must be >= 1"));
    }

    let mut generated = 0usize;
    for mailbox in mailboxes::list_for_user(&state.pool, user_id).await? {
        generated += enrichment_service::generate_for_mailbox(
            &state.pool,
            state.ai.as_ref(),
            mailbox.id,
            limit,
        )
        .await?;
    }
    Ok(Json(json!({ "generated": generated })))
}
