use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::models::Column;

pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Column>> {
    let rows = sqlx::query_as::<_, Column>(
        "SELECT * FROM kanban_columns WHERE user_id = ? ORDER BY order_index ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_owned(pool: &SqlitePool, id: i64, user_id: i64) -> Result<Column> {
    let row = sqlx::query_as::<_, Column>(
        "SELECT * FROM kanban_columns WHERE id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.ok_or(Error::NotFound("column"))
}

pub async fn title_exists(
    pool: &SqlitePool,
    user_id: i64,
    title: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM kanban_columns WHERE user_id = ? AND title = ? AND id != ?",
    )
    .bind(user_id)
    .bind(title)
    .bind(exclude_id.unwrap_or(-1))
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn max_order_index(pool: &SqlitePool, user_id: i64) -> Result<Option<i64>> {
    let max: Option<i64> =
        sqlx::query_scalar("SELECT MAX(order_index) FROM kanban_columns WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(max)
}

pub async fn insert(
    pool: &SqlitePool,
    user_id: i64,
    title: &str,
    order_index: i64,
    gmail_label: Option<&str>,
    color: &str,
    is_default: bool,
) -> Result<Column> {
    let now = Utc::now();
    let res = sqlx::query(
        r#"INSERT INTO kanban_columns (user_id, title, order_index, gmail_label, color, is_default, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(user_id)
    .bind(title)
    .bind(order_index)
    .bind(gmail_label)
    .bind(color)
    .bind(is_default)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_owned(pool, res.last_insert_rowid(), user_id).await
}

pub async fn update_fields(
    pool: &SqlitePool,
    id: i64,
    title: &str,
    order_index: i64,
    gmail_label: Option<&str>,
    color: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE kanban_columns SET title = ?, order_index = ?, gmail_label = ?, color = ?, updated_at = ? WHERE id = ?",
    )
    .bind(title)
    .bind(order_index)
    .bind(gmail_label)
    .bind(color)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Shift order indices by `delta` for the user's columns inside
/// `[from, to]`, excluding the column being moved.
pub async fn shift_range(
    pool: &SqlitePool,
    user_id: i64,
    from: i64,
    to: i64,
    delta: i64,
    exclude_id: i64,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE kanban_columns SET order_index = order_index + ?, updated_at = ?
           WHERE user_id = ? AND id != ? AND order_index >= ? AND order_index <= ?"#,
    )
    .bind(delta)
    .bind(Utc::now())
    .bind(user_id)
    .bind(exclude_id)
    .bind(from)
    .bind(to)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE emails SET column_id = NULL WHERE column_id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM kanban_columns WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Rewrites the user's order indices to the dense prefix 0..N-1, keeping
/// the current relative order.
pub async fn densify(pool: &SqlitePool, user_id: i64) -> Result<()> {
    let columns = list_for_user(pool, user_id).await?;
    for (i, col) in columns.iter().enumerate() {
        if col.order_index != i as i64 {
            sqlx::query("UPDATE kanban_columns SET order_index = ?, updated_at = ? WHERE id = ?")
                .bind(i as i64)
                .bind(Utc::now())
                .bind(col.id)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

pub async fn count_for_user(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kanban_columns WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
