use chrono::{DateTime, Utc};
use serde::Serialize;

/// A kanban bucket, optionally bound to a Gmail label so moves mirror
/// upstream.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub order_index: i64,
    pub gmail_label: Option<String>,
    pub color: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
