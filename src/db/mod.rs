use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, SqlitePool};

pub mod columns;
pub mod mailboxes;
pub mod messages;
pub mod users;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let url = normalize_sqlite_url(database_url);
    if let Some(path) = db_file_path(&url) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if !path.exists() {
            std::fs::File::create(&path).ok();
        }
    }
    let pool = SqlitePoolOptions::new().connect(&url).await?;
    Ok(pool)
}

/// Applies every `migrations/*.sql` file in filename order.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir("migrations")?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("sql") {
            let sql = std::fs::read_to_string(&path)?;
            pool.execute(sql.as_str()).await?;
        }
    }
    Ok(())
}

/// Applies the bundled schema directly; used by tests running on
/// `sqlite::memory:` where no migrations directory is on disk.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(include_str!("../../migrations/0001_init.sql"))
        .await?;
    Ok(())
}

// sqlx expects sqlite://path or sqlite::memory:; accept the looser forms
// people put in .env files.
fn normalize_sqlite_url(input: &str) -> String {
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if let Some(rest) = input.strip_prefix("sqlite:") {
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if let Some(rest) = input.strip_prefix("file:") {
        return format!("sqlite://{rest}");
    }
    format!("sqlite://{input}")
}

fn db_file_path(url: &str) -> Option<std::path::PathBuf> {
    let rest = url.strip_prefix("sqlite://")?;
    if rest == ":memory:" || rest.is_empty() {
        return None;
    }
    Some(std::path::PathBuf::from(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_sqlite_urls() {
        assert_eq!(normalize_sqlite_url("sqlite://a.db"), "sqlite://a.db");
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_sqlite_url("sqlite:a.db"), "sqlite://a.db");
        assert_eq!(normalize_sqlite_url("file:a.db"), "sqlite://a.db");
        assert_eq!(normalize_sqlite_url("a.db"), "sqlite://a.db");
    }
}
