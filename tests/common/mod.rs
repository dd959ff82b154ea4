//! Shared fixtures: in-memory store, a scriptable mail provider, and a
//! deterministic AI stub.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use mailboard::ai::{AiProvider, EMBEDDING_DIM};
use mailboard::db;
use mailboard::error::{Error, Result};
use mailboard::gmail::{
    HistoryDiff, ListParams, MailProvider, MailboxProfile, MessagePage, OutgoingMessage,
    ParsedMessage, ProviderLabel, RefreshedToken, TokenBundle,
};
use mailboard::models::Mailbox;
use mailboard::secretbox::SecretBox;

pub const TEST_KEY: [u8; 32] = [42u8; 32];

pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.expect("pool");
    db::apply_schema(&pool).await.expect("schema");
    pool
}

pub fn secrets() -> SecretBox {
    SecretBox::new(&TEST_KEY)
}

pub async fn seed_user(pool: &SqlitePool) -> i64 {
    let user = db::users::create(pool, "user@example.com", "Test", "User", "external", None)
        .await
        .expect("user");
    user.id
}

pub async fn seed_mailbox(pool: &SqlitePool, user_id: i64) -> Mailbox {
    let secrets = secrets();
    db::mailboxes::create(
        pool,
        user_id,
        "user@gmail.com",
        &secrets.encrypt("access-token").unwrap(),
        &secrets.encrypt("refresh-token").unwrap(),
        Some(Utc::now() + Duration::hours(1)),
    )
    .await
    .expect("mailbox")
}

pub fn received_at(offset_minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap() + Duration::minutes(offset_minutes)
}

pub fn parsed(id: &str, subject: &str, labels: &[&str]) -> ParsedMessage {
    ParsedMessage {
        gmail_message_id: id.to_string(),
        gmail_thread_id: format!("t-{id}"),
        subject: Some(subject.to_string()),
        snippet: Some(format!("{subject} …")),
        from_email: "sender@example.com".to_string(),
        from_name: None,
        to_emails: vec!["user@gmail.com".to_string()],
        cc_emails: Vec::new(),
        bcc_emails: Vec::new(),
        body_html: None,
        body_text: Some(format!("body of {subject}")),
        received_at: received_at(0),
        is_read: !labels.contains(&"UNREAD"),
        is_starred: labels.contains(&"STARRED"),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        attachments: Vec::new(),
    }
}

/// Scripted history responses for the mock provider.
pub enum MockHistory {
    Diff(HistoryDiff),
    Stale,
    Transient(String),
}

#[derive(Default)]
pub struct MockProvider {
    /// Hydratable messages, in inbox listing order.
    pub messages: Mutex<Vec<ParsedMessage>>,
    /// Responses popped per get_history_changes call.
    pub history: Mutex<VecDeque<MockHistory>>,
    pub profile_history_id: Mutex<String>,
    pub modify_calls: Mutex<Vec<(String, Vec<String>, Vec<String>)>>,
    pub fail_modify: AtomicBool,
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl MockProvider {
    pub fn new(history_id: &str) -> Self {
        Self {
            profile_history_id: Mutex::new(history_id.to_string()),
            ..Default::default()
        }
    }

    pub fn push_message(&self, msg: ParsedMessage) {
        self.messages.lock().unwrap().push(msg);
    }

    pub fn push_history(&self, entry: MockHistory) {
        self.history.lock().unwrap().push_back(entry);
    }
}

#[async_trait]
impl MailProvider for MockProvider {
    async fn list_messages(&self, _token: &str, params: &ListParams) -> Result<MessagePage> {
        let messages = self.messages.lock().unwrap();
        let offset: usize = params
            .page_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let ids: Vec<String> = messages
            .iter()
            .skip(offset)
            .take(params.max_results as usize)
            .map(|m| m.gmail_message_id.clone())
            .collect();
        let consumed = offset + ids.len();
        let next_page_token = (consumed < messages.len()).then(|| consumed.to_string());
        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_message(&self, _token: &str, id: &str) -> Result<ParsedMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.gmail_message_id == id)
            .cloned()
            .ok_or(Error::NotFound("provider resource"))
    }

    async fn get_messages(&self, token: &str, ids: &[String]) -> Vec<ParsedMessage> {
        let mut out = Vec::new();
        for id in ids {
            if let Ok(msg) = self.get_message(token, id).await {
                out.push(msg);
            }
        }
        out
    }

    async fn get_history_changes(&self, _token: &str, _since: &str) -> Result<HistoryDiff> {
        match self.history.lock().unwrap().pop_front() {
            Some(MockHistory::Diff(diff)) => Ok(diff),
            Some(MockHistory::Stale) => Err(Error::StaleCursor),
            Some(MockHistory::Transient(msg)) => Err(Error::ProviderTransient(msg)),
            None => Ok(HistoryDiff::default()),
        }
    }

    async fn modify_message_labels(
        &self,
        _token: &str,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<()> {
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }
        if self.fail_modify.load(Ordering::SeqCst) {
            return Err(Error::ProviderTransient("modify failed".into()));
        }
        self.modify_calls
            .lock()
            .unwrap()
            .push((id.to_string(), add.to_vec(), remove.to_vec()));
        Ok(())
    }

    async fn get_profile(&self, _token: &str) -> Result<MailboxProfile> {
        Ok(MailboxProfile {
            email_address: "user@gmail.com".to_string(),
            messages_total: self.messages.lock().unwrap().len() as i64,
            threads_total: 0,
            history_id: self.profile_history_id.lock().unwrap().clone(),
        })
    }

    async fn send_email(&self, _token: &str, draft: &OutgoingMessage) -> Result<String> {
        self.sent.lock().unwrap().push(draft.clone());
        Ok("sent-1".to_string())
    }

    async fn refresh_tokens(&self, _refresh_token: &str) -> Result<RefreshedToken> {
        Ok(RefreshedToken {
            access_token: "refreshed-access".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<TokenBundle> {
        Ok(TokenBundle {
            access_token: "access-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn list_labels(&self, _token: &str) -> Result<Vec<ProviderLabel>> {
        Ok(vec![
            ProviderLabel {
                id: "INBOX".into(),
                name: "INBOX".into(),
                label_type: "system".into(),
            },
            ProviderLabel {
                id: "Label_7".into(),
                name: "Receipts".into(),
                label_type: "user".into(),
            },
        ])
    }

    async fn get_attachment(
        &self,
        _token: &str,
        _message_id: &str,
        _attachment_id: &str,
    ) -> Result<Vec<u8>> {
        Ok(b"attachment-bytes".to_vec())
    }
}

/// Deterministic embeddings: fixed vectors per input, zero otherwise.
#[derive(Default)]
pub struct MockAi {
    pub embeddings: Mutex<HashMap<String, Vec<f32>>>,
    pub fail_embed: AtomicBool,
}

impl MockAi {
    pub fn map(&self, text: &str, vector: Vec<f32>) {
        self.embeddings
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }
}

/// A unit vector along `axis`, padded to the embedding width.
pub fn unit_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[axis] = 1.0;
    v
}

#[async_trait]
impl AiProvider for MockAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail_embed.load(Ordering::SeqCst) {
            return Err(Error::Ai("embedding unavailable".into()));
        }
        Ok(self
            .embeddings
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| {
                let mut v = vec![0.0f32; EMBEDDING_DIM];
                v[0] = 1.0;
                v
            }))
    }

    async fn summarize(&self, _text: &str) -> Result<String> {
        Ok("A short summary.".to_string())
    }
}
