use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use chrono::Duration;

use super::AppState;
use crate::auth::AuthUser;
use crate::db::{mailboxes, messages};
use crate::error::Result;

/// Streams attachment bytes from the provider; nothing binary is stored
/// locally.
pub async fn download(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<(HeaderMap, Vec<u8>)> {
    let (attachment, mailbox_id, gmail_message_id) =
        messages::attachment_owned(&state.pool, id, user_id).await?;
    let mailbox = mailboxes::find_owned(&state.pool, mailbox_id, user_id).await?;

    let token = state
        .engine
        .access_token(&mailbox, Duration::minutes(5))
        .await?;
    let bytes = state
        .provider
        .get_attachment(&token, &gmail_message_id, &attachment.gmail_attachment_id)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&attachment.mime_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "attachment; filename*=UTF-8''{}",
            percent_encode(&attachment.filename)
        ))
        .unwrap_or(HeaderValue::from_static("attachment")),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=3600"),
    );
    Ok((headers, bytes))
}

/// RFC 5987 percent-encoding for the extended filename parameter.
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
