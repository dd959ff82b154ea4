mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{parsed, secrets, seed_mailbox, seed_user, setup_pool, MockProvider};
use mailboard::db::messages::{self, EmailFilter, EmailSort};
use mailboard::db::mailboxes;
use mailboard::services::column_service::{self, CreateColumn};
use mailboard::services::move_service;
use mailboard::services::sync_service::{SyncEngine, DEFAULT_FULL_SYNC_LIMIT};

async fn setup() -> (sqlx::SqlitePool, i64, i64, Arc<MockProvider>, SyncEngine) {
    let pool = setup_pool().await;
    let user_id = seed_user(&pool).await;
    let mailbox = seed_mailbox(&pool, user_id).await;

    let provider = Arc::new(MockProvider::new("H1"));
    provider.push_message(parsed("M1", "ship it", &["INBOX", "UNREAD"]));
    let engine = SyncEngine::new(pool.clone(), provider.clone(), secrets());
    engine
        .full_sync(mailbox.id, DEFAULT_FULL_SYNC_LIMIT)
        .await
        .unwrap();
    (pool, user_id, mailbox.id, provider, engine)
}

#[tokio::test]
async fn move_with_archive_drops_inbox_label() {
    let (pool, user_id, mailbox_id, provider, engine) = setup().await;

    let column = column_service::create(
        &pool,
        user_id,
        CreateColumn {
            title: "Done".into(),
            order_index: None,
            gmail_label: None,
            color: None,
        },
    )
    .await
    .unwrap();

    let email = messages::find_by_gmail_id(&pool, mailbox_id, "M1")
        .await
        .unwrap()
        .unwrap();
    let moved = move_service::move_to_column(&pool, &engine, user_id, email.id, column.id, true)
        .await
        .unwrap();

    assert!(!moved.labels.iter().any(|l| l == "INBOX"));
    assert_eq!(moved.column_id, Some(column.id));

    let calls = provider.modify_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (gmail_id, add, remove) = &calls[0];
    assert_eq!(gmail_id, "M1");
    assert!(add.is_empty());
    assert_eq!(remove, &vec!["INBOX".to_string()]);
    drop(calls);

    // the listing no longer returns it under the INBOX label filter
    let filter = EmailFilter {
        label: Some("INBOX".into()),
        ..Default::default()
    };
    let (rows, total) =
        messages::list_filtered(&pool, user_id, &filter, EmailSort::ReceivedAt, true, 1, 20)
            .await
            .unwrap();
    assert_eq!(total, 0);
    assert!(rows.is_empty());
}

#[tokio::test]
async fn move_to_labeled_column_adds_its_label() {
    let (pool, user_id, mailbox_id, provider, engine) = setup().await;

    let column = column_service::create(
        &pool,
        user_id,
        CreateColumn {
            title: "Starred work".into(),
            order_index: None,
            gmail_label: Some("STARRED".into()),
            color: None,
        },
    )
    .await
    .unwrap();

    let email = messages::find_by_gmail_id(&pool, mailbox_id, "M1")
        .await
        .unwrap()
        .unwrap();
    let moved = move_service::move_to_column(&pool, &engine, user_id, email.id, column.id, false)
        .await
        .unwrap();

    assert!(moved.labels.iter().any(|l| l == "STARRED"));
    assert!(moved.is_starred);
    assert!(moved.labels.iter().any(|l| l == "INBOX"));

    let calls = provider.modify_calls.lock().unwrap();
    assert_eq!(calls[0].1, vec!["STARRED".to_string()]);
    assert!(calls[0].2.is_empty());
}

#[tokio::test]
async fn provider_failure_leaves_local_state_untouched() {
    let (pool, user_id, mailbox_id, provider, engine) = setup().await;

    let column = column_service::create(
        &pool,
        user_id,
        CreateColumn {
            title: "Done".into(),
            order_index: None,
            gmail_label: None,
            color: None,
        },
    )
    .await
    .unwrap();

    provider.fail_modify.store(true, Ordering::SeqCst);
    let email = messages::find_by_gmail_id(&pool, mailbox_id, "M1")
        .await
        .unwrap()
        .unwrap();
    let result =
        move_service::move_to_column(&pool, &engine, user_id, email.id, column.id, true).await;
    assert!(result.is_err());

    let unchanged = messages::find_by_gmail_id(&pool, mailbox_id, "M1")
        .await
        .unwrap()
        .unwrap();
    assert!(unchanged.labels.iter().any(|l| l == "INBOX"));
    assert_eq!(unchanged.column_id, None);
}

#[tokio::test]
async fn move_to_unlabeled_column_without_archive_skips_provider() {
    let (pool, user_id, mailbox_id, provider, engine) = setup().await;

    let column = column_service::create(
        &pool,
        user_id,
        CreateColumn {
            title: "Someday".into(),
            order_index: None,
            gmail_label: None,
            color: None,
        },
    )
    .await
    .unwrap();

    let email = messages::find_by_gmail_id(&pool, mailbox_id, "M1")
        .await
        .unwrap()
        .unwrap();
    let moved = move_service::move_to_column(&pool, &engine, user_id, email.id, column.id, false)
        .await
        .unwrap();

    assert_eq!(moved.column_id, Some(column.id));
    assert!(provider.modify_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn counters_recomputed_after_move() {
    let (pool, user_id, mailbox_id, _provider, engine) = setup().await;

    let column = column_service::create(
        &pool,
        user_id,
        CreateColumn {
            title: "Done".into(),
            order_index: None,
            gmail_label: None,
            color: None,
        },
    )
    .await
    .unwrap();
    let email = messages::find_by_gmail_id(&pool, mailbox_id, "M1")
        .await
        .unwrap()
        .unwrap();
    move_service::move_to_column(&pool, &engine, user_id, email.id, column.id, true)
        .await
        .unwrap();

    let mailbox = mailboxes::find(&pool, mailbox_id).await.unwrap().unwrap();
    // M1 is still unread, archiving does not change that
    assert_eq!(mailbox.unread_count, 1);
    assert_eq!(mailbox.total_emails, 1);
}
