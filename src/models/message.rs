use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNREAD_LABEL: &str = "UNREAD";
pub const STARRED_LABEL: &str = "STARRED";
pub const INBOX_LABEL: &str = "INBOX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Primary,
    Social,
    Promotions,
    Updates,
    Forums,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Social => "social",
            Self::Promotions => "promotions",
            Self::Updates => "updates",
            Self::Forums => "forums",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "social" => Self::Social,
            "promotions" => Self::Promotions,
            "updates" => Self::Updates,
            "forums" => Self::Forums,
            _ => Self::Primary,
        }
    }

    /// Gmail category labels decide the bucket; everything else is primary.
    pub fn from_labels(labels: &[String]) -> Self {
        for label in labels {
            match label.as_str() {
                "CATEGORY_SOCIAL" => return Self::Social,
                "CATEGORY_PROMOTIONS" => return Self::Promotions,
                "CATEGORY_UPDATES" => return Self::Updates,
                "CATEGORY_FORUMS" => return Self::Forums,
                _ => {}
            }
        }
        Self::Primary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    None,
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: i64,
    pub mailbox_id: i64,
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
    pub has_attachments: bool,
    pub labels: Vec<String>,
    pub category: Category,
    pub task_status: TaskStatus,
    pub task_deadline: Option<DateTime<Utc>>,
    pub is_pinned: bool,
    pub is_snoozed: bool,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub ai_summary: Option<String>,
    pub ai_action_items: Option<serde_json::Value>,
    pub urgency_score: Option<i64>,
    pub column_id: Option<i64>,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub embedding_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// `(old \ removed) ∪ added` with order preserved from `old` and appended
/// additions, no duplicates.
pub fn apply_label_delta(old: &[String], added: &[String], removed: &[String]) -> Vec<String> {
    let mut out: Vec<String> = old
        .iter()
        .filter(|l| !removed.contains(l))
        .cloned()
        .collect();
    for label in added {
        if !out.contains(label) {
            out.push(label.clone());
        }
    }
    out
}

pub fn is_read_from_labels(labels: &[String]) -> bool {
    !labels.iter().any(|l| l == UNREAD_LABEL)
}

pub fn is_starred_from_labels(labels: &[String]) -> bool {
    labels.iter().any(|l| l == STARRED_LABEL)
}
