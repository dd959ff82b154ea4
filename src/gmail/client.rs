//! Gmail REST client. All failures are classified into the error taxonomy:
//! 429/5xx/transport → transient, 401/403 → fatal, history 404 → stale
//! cursor.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use futures::StreamExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::warn;

use super::parse::parse_message;
use super::send::compose_mime;
use super::types::*;
use super::{
    HistoryDiff, LabelDelta, ListParams, MailProvider, MailboxProfile, MessagePage,
    OutgoingMessage, ParsedMessage, ProviderLabel, RefreshedToken, TokenBundle,
};
use crate::config::Config;
use crate::error::{Error, Result};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Pages and hydration batches are capped at 50 ids.
const BATCH_SIZE: usize = 50;
const HISTORY_PAGE_SIZE: i64 = 100;
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
/// Tokens are considered expired this long before their real expiry.
const TOKEN_SKEW_SECONDS: i64 = 60;
const BODY_SNIPPET_LEN: usize = 200;

pub struct GmailClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GmailClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            api_base: GMAIL_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            redirect_uri: config.google_redirect_uri.clone(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
        query: &[(&str, String)],
        stale_on_404: bool,
    ) -> Result<T> {
        let mut backoff = 1u64;
        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = self
                .http
                .get(url)
                .query(query)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| Error::ProviderTransient(format!("{url}: {e}")))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RATE_LIMIT_RETRIES {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(backoff);
                tokio::time::sleep(std::time::Duration::from_secs(retry_after)).await;
                backoff = (backoff * 2).min(32);
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| Error::ProviderTransient(format!("{url}: {e}")))?;
            if !status.is_success() {
                return Err(classify_failure(status, &body, stale_on_404));
            }
            return serde_json::from_str(&body)
                .map_err(|e| Error::Other(anyhow::anyhow!("decode {url}: {e}")));
        }
        Err(Error::ProviderTransient(format!("{url}: rate limited")))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::ProviderTransient(format!("{url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ProviderTransient(format!("{url}: {e}")))?;
        if !status.is_success() {
            return Err(classify_failure(status, &body, false));
        }
        serde_json::from_str(&body).map_err(|e| Error::Other(anyhow::anyhow!("decode {url}: {e}")))
    }
}

fn classify_failure(status: StatusCode, body: &str, stale_on_404: bool) -> Error {
    let snippet = snippet(body);
    match status {
        StatusCode::NOT_FOUND if stale_on_404 => Error::StaleCursor,
        StatusCode::NOT_FOUND => Error::NotFound("provider resource"),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::ProviderFatal(format!("{status}: {snippet}"))
        }
        StatusCode::TOO_MANY_REQUESTS => Error::ProviderTransient(format!("{status}: {snippet}")),
        s if s.is_server_error() => Error::ProviderTransient(format!("{status}: {snippet}")),
        _ => Error::ProviderFatal(format!("{status}: {snippet}")),
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_SNIPPET_LEN {
        trimmed.to_string()
    } else {
        format!("{}…", &trimmed[..BODY_SNIPPET_LEN])
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(&self, access_token: &str, params: &ListParams) -> Result<MessagePage> {
        let url = format!("{}/users/me/messages", self.api_base);
        let mut query = vec![(
            "maxResults",
            params.max_results.clamp(1, BATCH_SIZE as i64).to_string(),
        )];
        if let Some(token) = &params.page_token {
            query.push(("pageToken", token.clone()));
        }
        if let Some(q) = &params.query {
            query.push(("q", q.clone()));
        }
        for label in &params.label_ids {
            query.push(("labelIds", label.clone()));
        }

        let list: GmailMessageList = self.get_json(access_token, &url, &query, false).await?;
        Ok(MessagePage {
            ids: list
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|m| m.id)
                .collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn get_message(&self, access_token: &str, id: &str) -> Result<ParsedMessage> {
        let url = format!("{}/users/me/messages/{id}", self.api_base);
        let msg: GmailMessage = self
            .get_json(access_token, &url, &[("format", "full".to_string())], false)
            .await?;
        Ok(parse_message(&msg))
    }

    async fn get_messages(&self, access_token: &str, ids: &[String]) -> Vec<ParsedMessage> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_SIZE) {
            let fetched: Vec<Option<ParsedMessage>> = futures::stream::iter(chunk.to_vec().into_iter().map(|id: String| {
                async move {
                    match self.get_message(access_token, &id).await {
                        Ok(msg) => Some(msg),
                        Err(e) => {
                            warn!(gmail_message_id = %id, error = %e, "skipping message hydration");
                            None
                        }
                    }
                }
            }))
            .buffer_unordered(BATCH_SIZE)
            .collect()
            .await;
            out.extend(fetched.into_iter().flatten());
        }
        out
    }

    async fn get_history_changes(&self, access_token: &str, since: &str) -> Result<HistoryDiff> {
        let url = format!("{}/users/me/history", self.api_base);
        let mut diff = HistoryDiff::default();
        let mut seen_added = HashSet::new();
        let mut seen_deleted = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("startHistoryId", since.to_string()),
                ("maxResults", HISTORY_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let list: GmailHistoryList = self.get_json(access_token, &url, &query, true).await?;
            if let Some(history_id) = list.history_id {
                diff.cursor = Some(history_id);
            }

            for record in list.history.unwrap_or_default() {
                for added in record.messages_added.unwrap_or_default() {
                    if seen_added.insert(added.message.id.clone()) {
                        diff.messages_added.push(added.message.id);
                    }
                }
                for deleted in record.messages_deleted.unwrap_or_default() {
                    if seen_deleted.insert(deleted.message.id.clone()) {
                        diff.messages_deleted.push(deleted.message.id);
                    }
                }
                for event in record.labels_added.unwrap_or_default() {
                    diff.labels_modified.push(LabelDelta {
                        gmail_message_id: event.message.id,
                        labels_added: event.label_ids.unwrap_or_default(),
                        labels_removed: Vec::new(),
                    });
                }
                for event in record.labels_removed.unwrap_or_default() {
                    diff.labels_modified.push(LabelDelta {
                        gmail_message_id: event.message.id,
                        labels_added: Vec::new(),
                        labels_removed: event.label_ids.unwrap_or_default(),
                    });
                }
            }

            page_token = list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(diff)
    }

    async fn modify_message_labels(
        &self,
        access_token: &str,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<()> {
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }
        let url = format!("{}/users/me/messages/{id}/modify", self.api_base);
        let payload = serde_json::json!({
            "addLabelIds": add,
            "removeLabelIds": remove,
        });
        let _: GmailMessageStub = self.post_json(access_token, &url, &payload).await?;
        Ok(())
    }

    async fn get_profile(&self, access_token: &str) -> Result<MailboxProfile> {
        let url = format!("{}/users/me/profile", self.api_base);
        let profile: GmailProfile = self.get_json(access_token, &url, &[], false).await?;
        Ok(MailboxProfile {
            email_address: profile.email_address,
            messages_total: profile.messages_total.unwrap_or(0),
            threads_total: profile.threads_total.unwrap_or(0),
            history_id: profile.history_id,
        })
    }

    async fn send_email(&self, access_token: &str, draft: &OutgoingMessage) -> Result<String> {
        let raw = compose_mime(draft)?;
        let url = format!("{}/users/me/messages/send", self.api_base);
        let mut payload = serde_json::json!({ "raw": URL_SAFE_NO_PAD.encode(raw) });
        if let Some(thread_id) = &draft.thread_id {
            payload["threadId"] = serde_json::json!(thread_id);
        }
        let sent: GmailSendResponse = self.post_json(access_token, &url, &payload).await?;
        Ok(sent.id)
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::ProviderTransient(format!("token refresh: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ProviderTransient(format!("token refresh: {e}")))?;
        if !status.is_success() {
            // invalid_grant means the refresh token was revoked; retrying
            // will not help.
            if body.contains("invalid_grant") || status == StatusCode::BAD_REQUEST {
                return Err(Error::ProviderFatal(format!("token refresh: {}", snippet(&body))));
            }
            return Err(classify_failure(status, &body, false));
        }

        let token: OAuthTokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Other(anyhow::anyhow!("decode token response: {e}")))?;
        Ok(RefreshedToken {
            access_token: token.access_token,
            expires_at: Utc::now()
                + Duration::seconds(token.expires_in.saturating_sub(TOKEN_SKEW_SECONDS)),
        })
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenBundle> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| Error::ProviderTransient(format!("code exchange: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ProviderTransient(format!("code exchange: {e}")))?;
        if !status.is_success() {
            return Err(Error::Unauthorized(format!(
                "oauth code exchange failed: {}",
                snippet(&body)
            )));
        }

        let token: OAuthTokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Other(anyhow::anyhow!("decode token response: {e}")))?;
        let refresh_token = token
            .refresh_token
            .ok_or_else(|| Error::Unauthorized("oauth exchange returned no refresh token".into()))?;
        Ok(TokenBundle {
            access_token: token.access_token,
            refresh_token,
            expires_at: Utc::now()
                + Duration::seconds(token.expires_in.saturating_sub(TOKEN_SKEW_SECONDS)),
        })
    }

    async fn list_labels(&self, access_token: &str) -> Result<Vec<ProviderLabel>> {
        let url = format!("{}/users/me/labels", self.api_base);
        let list: GmailLabelList = self.get_json(access_token, &url, &[], false).await?;
        Ok(list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| ProviderLabel {
                id: l.id,
                name: l.name,
                label_type: l.label_type.unwrap_or_else(|| "system".into()),
            })
            .collect())
    }

    async fn get_attachment(
        &self,
        access_token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>> {
        let url = format!(
            "{}/users/me/messages/{message_id}/attachments/{attachment_id}",
            self.api_base
        );
        let body: GmailAttachmentBody = self.get_json(access_token, &url, &[], false).await?;
        let data = body.data.unwrap_or_default();
        URL_SAFE_NO_PAD
            .decode(data.as_bytes())
            .map_err(|e| Error::Other(anyhow::anyhow!("decode attachment data: {e}")))
    }
}
