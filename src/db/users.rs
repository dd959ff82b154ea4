use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::User;

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn create(
    pool: &SqlitePool,
    email: &str,
    first_name: &str,
    last_name: &str,
    auth_provider: &str,
    external_id: Option<&str>,
) -> Result<User> {
    let now = Utc::now();
    let email = email.to_lowercase();
    let res = sqlx::query(
        r#"INSERT INTO users (email, first_name, last_name, auth_provider, external_id, is_verified, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, 0, ?, ?)"#,
    )
    .bind(&email)
    .bind(first_name)
    .bind(last_name)
    .bind(auth_provider)
    .bind(external_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(User {
        id: res.last_insert_rowid(),
        email,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        auth_provider: auth_provider.to_string(),
        external_id: external_id.map(str::to_string),
        is_verified: false,
        created_at: now,
        updated_at: now,
    })
}
