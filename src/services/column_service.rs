//! Kanban column CRUD: dense per-user ordering, gap-preserving reorder,
//! idempotent default seeding.

use sqlx::SqlitePool;

use crate::db::columns;
use crate::error::{Error, Result};
use crate::models::Column;

const DEFAULT_COLOR: &str = "gray";

/// (title, gmail label, color, is_default), seeded in index order.
const DEFAULT_COLUMNS: &[(&str, Option<&str>, &str, bool)] = &[
    ("Inbox", Some("INBOX"), "blue", true),
    ("Important", Some("IMPORTANT"), "red", true),
    ("Starred", Some("STARRED"), "yellow", true),
    ("To Do", None, "orange", false),
    ("In Progress", None, "purple", false),
    ("Done", None, "green", false),
];

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateColumn {
    pub title: String,
    pub order_index: Option<i64>,
    pub gmail_label: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateColumn {
    pub title: Option<String>,
    pub order_index: Option<i64>,
    pub gmail_label: Option<String>,
    pub color: Option<String>,
}

pub async fn list(pool: &SqlitePool, user_id: i64) -> Result<Vec<Column>> {
    columns::list_for_user(pool, user_id).await
}

pub async fn create(pool: &SqlitePool, user_id: i64, input: CreateColumn) -> Result<Column> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(Error::validation("column title must not be empty"));
    }
    if columns::title_exists(pool, user_id, title, None).await? {
        return Err(Error::conflict(format!("column \"{title}\" already exists")));
    }

    let order_index = match input.order_index {
        Some(idx) => idx,
        None => columns::max_order_index(pool, user_id).await?.map_or(0, |m| m + 1),
    };

    columns::insert(
        pool,
        user_id,
        title,
        order_index,
        input.gmail_label.as_deref(),
        input.color.as_deref().unwrap_or(DEFAULT_COLOR),
        false,
    )
    .await
}

pub async fn update(
    pool: &SqlitePool,
    user_id: i64,
    column_id: i64,
    input: UpdateColumn,
) -> Result<Column> {
    let column = columns::find_owned(pool, column_id, user_id).await?;

    let title = match &input.title {
        Some(t) => {
            let t = t.trim();
            if t.is_empty() {
                return Err(Error::validation("column title must not be empty"));
            }
            if t != column.title && columns::title_exists(pool, user_id, t, Some(column_id)).await? {
                return Err(Error::conflict(format!("column \"{t}\" already exists")));
            }
            t.to_string()
        }
        None => column.title.clone(),
    };

    let count = columns::count_for_user(pool, user_id).await?;
    let new_index = input
        .order_index
        .unwrap_or(column.order_index)
        .clamp(0, (count - 1).max(0));
    if new_index != column.order_index {
        // Shift the open range between the old and new slot by one so the
        // sequence stays dense.
        if new_index > column.order_index {
            columns::shift_range(pool, user_id, column.order_index + 1, new_index, -1, column_id)
                .await?;
        } else {
            columns::shift_range(pool, user_id, new_index, column.order_index - 1, 1, column_id)
                .await?;
        }
    }

    let gmail_label = match &input.gmail_label {
        Some(label) => Some(label.clone()),
        None => column.gmail_label.clone(),
    };
    columns::update_fields(
        pool,
        column_id,
        &title,
        new_index,
        gmail_label.as_deref(),
        input.color.as_deref().unwrap_or(&column.color),
    )
    .await?;

    columns::find_owned(pool, column_id, user_id).await
}

pub async fn delete(pool: &SqlitePool, user_id: i64, column_id: i64) -> Result<()> {
    let column = columns::find_owned(pool, column_id, user_id).await?;
    if column.is_default {
        return Err(Error::conflict("default columns cannot be deleted"));
    }
    columns::delete(pool, column_id).await?;
    columns::densify(pool, user_id).await?;
    Ok(())
}

/// Seeds the default board. Safe to call repeatedly: once any column
/// exists the user's board is considered initialized.
pub async fn initialize(pool: &SqlitePool, user_id: i64) -> Result<Vec<Column>> {
    if columns::count_for_user(pool, user_id).await? == 0 {
        for (index, (title, label, color, is_default)) in DEFAULT_COLUMNS.iter().enumerate() {
            columns::insert(pool, user_id, title, index as i64, *label, color, *is_default)
                .await?;
        }
    }
    columns::list_for_user(pool, user_id).await
}
