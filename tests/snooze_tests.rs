mod common;

use chrono::{Duration, Utc};
use common::{parsed, seed_mailbox, seed_user, setup_pool};
use mailboard::db::messages;

async fn seed_snoozed(
    pool: &sqlx::SqlitePool,
    mailbox_id: i64,
    gmail_id: &str,
    until_offset: Duration,
) -> i64 {
    let outcome = messages::upsert_parsed(pool, mailbox_id, &parsed(gmail_id, "snoozed", &["INBOX"]))
        .await
        .unwrap();
    let mut email = messages::find(pool, outcome.email_id).await.unwrap().unwrap();
    email.is_snoozed = true;
    email.snoozed_until = Some(Utc::now() + until_offset);
    messages::save_user_fields(pool, &email).await.unwrap();
    outcome.email_id
}

#[tokio::test]
async fn wake_clears_only_due_snoozes() {
    let pool = setup_pool().await;
    let user_id = seed_user(&pool).await;
    let mailbox = seed_mailbox(&pool, user_id).await;

    let due = seed_snoozed(&pool, mailbox.id, "M1", Duration::minutes(-5)).await;
    let future = seed_snoozed(&pool, mailbox.id, "M2", Duration::minutes(90)).await;

    let woken = messages::wake_due_snoozes(&pool, Utc::now()).await.unwrap();
    assert_eq!(woken, 1);

    let woken_email = messages::find(&pool, due).await.unwrap().unwrap();
    assert!(!woken_email.is_snoozed);
    assert!(woken_email.snoozed_until.is_none());

    let still_snoozed = messages::find(&pool, future).await.unwrap().unwrap();
    assert!(still_snoozed.is_snoozed);
    assert!(still_snoozed.snoozed_until.is_some());
}

#[tokio::test]
async fn wake_is_idempotent() {
    let pool = setup_pool().await;
    let user_id = seed_user(&pool).await;
    let mailbox = seed_mailbox(&pool, user_id).await;
    seed_snoozed(&pool, mailbox.id, "M1", Duration::minutes(-5)).await;

    let first = messages::wake_due_snoozes(&pool, Utc::now()).await.unwrap();
    assert_eq!(first, 1);
    let second = messages::wake_due_snoozes(&pool, Utc::now()).await.unwrap();
    assert_eq!(second, 0, "second run with no clock change is a no-op");
}

#[tokio::test]
async fn wake_ignores_snoozes_without_deadline() {
    let pool = setup_pool().await;
    let user_id = seed_user(&pool).await;
    let mailbox = seed_mailbox(&pool, user_id).await;

    let outcome = messages::upsert_parsed(&pool, mailbox.id, &parsed("M1", "odd state", &["INBOX"]))
        .await
        .unwrap();
    let mut email = messages::find(&pool, outcome.email_id).await.unwrap().unwrap();
    email.is_snoozed = true;
    email.snoozed_until = None;
    messages::save_user_fields(&pool, &email).await.unwrap();

    let woken = messages::wake_due_snoozes(&pool, Utc::now()).await.unwrap();
    assert_eq!(woken, 0);
}
