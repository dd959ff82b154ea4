use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::auth::AuthUser;
use crate::db::mailboxes;
use crate::error::Result;
use crate::gmail::VISIBLE_SYSTEM_LABELS;
use crate::models::Mailbox;

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Mailbox>>> {
    let list = mailboxes::list_for_user(&state.pool, user_id).await?;
    Ok(Json(list))
}

pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Mailbox>> {
    let mailbox = mailboxes::find_owned(&state.pool, id, user_id).await?;
    Ok(Json(mailbox))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub code: String,
    pub code_verifier: String,
}

/// Exchanges the OAuth code, stores encrypted tokens, and kicks off the
/// initial full sync in the background.
pub async fn connect(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ConnectRequest>,
) -> Result<(StatusCode, Json<Mailbox>)> {
    let tokens = state
        .provider
        .exchange_code(&body.code, &body.code_verifier)
        .await?;
    let profile = state.provider.get_profile(&tokens.access_token).await?;

    let access_enc = state.secrets.encrypt(&tokens.access_token)?;
    let refresh_enc = state.secrets.encrypt(&tokens.refresh_token)?;
    let mailbox = mailboxes::create(
        &state.pool,
        user_id,
        &profile.email_address,
        &access_enc,
        &refresh_enc,
        Some(tokens.expires_at),
    )
    .await?;

    let engine = state.engine.clone();
    let mailbox_id = mailbox.id;
    tokio::spawn(async move {
        if let Err(e) = engine.sync_on_demand(mailbox_id, true).await {
            tracing::warn!(mailbox_id, error = %e, "initial sync failed");
        }
    });

    Ok((StatusCode::CREATED, Json(mailbox)))
}

pub async fn sync(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Value>)> {
    mailboxes::find_owned(&state.pool, id, user_id).await?;

    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.sync_on_demand(id, false).await {
            tracing::warn!(mailbox_id = id, error = %e, "on-demand sync failed");
        }
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "sync started" })),
    ))
}

const STAT_LABELS: &[(&str, &str)] = &[
    ("inbox", "INBOX"),
    ("starred", "STARRED"),
    ("drafts", "DRAFT"),
    ("sent", "SENT"),
    ("spam", "SPAM"),
    ("trash", "TRASH"),
];

pub async fn stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let mailbox = mailboxes::find_owned(&state.pool, id, user_id).await?;

    let mut out = serde_json::Map::new();
    for (key, label) in STAT_LABELS {
        let (total, unread) =
            crate::db::messages::label_stats(&state.pool, mailbox.id, label).await?;
        out.insert(
            key.to_string(),
            json!({ "total": total, "unread": unread }),
        );
    }
    Ok(Json(Value::Object(out)))
}

pub async fn labels(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let mailbox = mailboxes::find_owned(&state.pool, id, user_id).await?;
    let token = state
        .engine
        .access_token(&mailbox, Duration::minutes(5))
        .await?;
    let all = state.provider.list_labels(&token).await?;

    let mut system = Vec::new();
    let mut user = Vec::new();
    for label in all {
        if VISIBLE_SYSTEM_LABELS.contains(&label.id.as_str()) {
            system.push(json!({ "id": label.id, "name": label.name }));
        } else if label.label_type == "user" {
            user.push(json!({ "id": label.id, "name": label.name }));
        }
        // everything else is provider-internal and hidden
    }
    Ok(Json(json!({ "system": system, "user": user })))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    mailboxes::find_owned(&state.pool, id, user_id).await?;
    mailboxes::soft_delete(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
