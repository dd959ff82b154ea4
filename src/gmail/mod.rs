//! Mail provider abstraction and its Gmail REST implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

mod client;
mod parse;
mod send;
pub mod types;

pub use client::GmailClient;
pub use send::compose_mime;

/// System labels exposed to clients; every other provider label with
/// `type=user` is user-defined, the rest stay internal.
pub const VISIBLE_SYSTEM_LABELS: &[&str] = &[
    "INBOX",
    "SENT",
    "DRAFT",
    "TRASH",
    "SPAM",
    "STARRED",
    "IMPORTANT",
    "CATEGORY_PERSONAL",
    "CATEGORY_SOCIAL",
    "CATEGORY_PROMOTIONS",
    "CATEGORY_UPDATES",
    "CATEGORY_FORUMS",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAttachment {
    pub gmail_attachment_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub content_id: Option<String>,
    pub is_inline: bool,
}

/// Provider message normalized to what the store ingests.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub gmail_message_id: String,
    pub gmail_thread_id: String,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub from_email: String,
    pub from_name: Option<String>,
    pub to_emails: Vec<String>,
    pub cc_emails: Vec<String>,
    pub bcc_emails: Vec<String>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_starred: bool,
    pub labels: Vec<String>,
    pub attachments: Vec<ParsedAttachment>,
}

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub max_results: i64,
    pub page_token: Option<String>,
    pub query: Option<String>,
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LabelDelta {
    pub gmail_message_id: String,
    pub labels_added: Vec<String>,
    pub labels_removed: Vec<String>,
}

/// Everything that changed since a history cursor, already paged to
/// completion and deduplicated. `cursor` is the latest the provider
/// reported across pages.
#[derive(Debug, Clone, Default)]
pub struct HistoryDiff {
    pub cursor: Option<String>,
    pub messages_added: Vec<String>,
    pub messages_deleted: Vec<String>,
    pub labels_modified: Vec<LabelDelta>,
}

#[derive(Debug, Clone)]
pub struct MailboxProfile {
    pub email_address: String,
    pub messages_total: i64,
    pub threads_total: i64,
    pub history_id: String,
}

#[derive(Debug, Clone)]
pub struct ProviderLabel {
    pub id: String,
    pub name: String,
    pub label_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// The upstream mail provider as consumed by the sync engine, move
/// coordinator, and send path. Implementations must surface stale history
/// cursors as [`crate::error::Error::StaleCursor`] and classify other
/// failures as transient or fatal.
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn list_messages(&self, access_token: &str, params: &ListParams) -> Result<MessagePage>;

    async fn get_message(&self, access_token: &str, id: &str) -> Result<ParsedMessage>;

    /// Best-effort hydration: per-id failures are logged and dropped from
    /// the result set.
    async fn get_messages(&self, access_token: &str, ids: &[String]) -> Vec<ParsedMessage>;

    async fn get_history_changes(&self, access_token: &str, since: &str) -> Result<HistoryDiff>;

    /// No-op when both deltas are empty.
    async fn modify_message_labels(
        &self,
        access_token: &str,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<()>;

    async fn get_profile(&self, access_token: &str) -> Result<MailboxProfile>;

    async fn send_email(&self, access_token: &str, draft: &OutgoingMessage) -> Result<String>;

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<RefreshedToken>;

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenBundle>;

    async fn list_labels(&self, access_token: &str) -> Result<Vec<ProviderLabel>>;

    async fn get_attachment(
        &self,
        access_token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>>;
}
