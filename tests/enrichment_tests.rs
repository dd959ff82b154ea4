mod common;

use std::sync::atomic::Ordering;

use common::{parsed, seed_mailbox, seed_user, setup_pool, unit_vector, MockAi};
use mailboard::db::messages;
use mailboard::services::enrichment_service;

#[tokio::test]
async fn generates_embeddings_for_unembedded_messages() {
    let pool = setup_pool().await;
    let user_id = seed_user(&pool).await;
    let mailbox = seed_mailbox(&pool, user_id).await;

    for id in ["M1", "M2", "M3"] {
        messages::upsert_parsed(&pool, mailbox.id, &parsed(id, "needs vector", &["INBOX"]))
            .await
            .unwrap();
    }
    // one message already has a vector and must not be re-embedded
    let done = messages::find_by_gmail_id(&pool, mailbox.id, "M3").await.unwrap().unwrap();
    messages::set_embedding(&pool, done.id, &unit_vector(5)).await.unwrap();

    let ai = MockAi::default();
    let generated = enrichment_service::generate_for_mailbox(&pool, &ai, mailbox.id, 50)
        .await
        .unwrap();
    assert_eq!(generated, 2);

    for id in ["M1", "M2", "M3"] {
        let email = messages::find_by_gmail_id(&pool, mailbox.id, id).await.unwrap().unwrap();
        assert!(email.embedding.is_some(), "{id} should be embedded");
        assert!(email.embedding_generated_at.is_some());
    }
}

#[tokio::test]
async fn batch_limit_is_respected() {
    let pool = setup_pool().await;
    let user_id = seed_user(&pool).await;
    let mailbox = seed_mailbox(&pool, user_id).await;

    for i in 0..5 {
        messages::upsert_parsed(&pool, mailbox.id, &parsed(&format!("M{i}"), "msg", &["INBOX"]))
            .await
            .unwrap();
    }

    let ai = MockAi::default();
    let generated = enrichment_service::generate_for_mailbox(&pool, &ai, mailbox.id, 2)
        .await
        .unwrap();
    assert_eq!(generated, 2);
}

#[tokio::test]
async fn embedding_failures_do_not_abort_the_batch() {
    let pool = setup_pool().await;
    let user_id = seed_user(&pool).await;
    let mailbox = seed_mailbox(&pool, user_id).await;

    for id in ["M1", "M2"] {
        messages::upsert_parsed(&pool, mailbox.id, &parsed(id, "msg", &["INBOX"]))
            .await
            .unwrap();
    }

    let ai = MockAi::default();
    ai.fail_embed.store(true, Ordering::SeqCst);
    let generated = enrichment_service::generate_for_mailbox(&pool, &ai, mailbox.id, 50)
        .await
        .unwrap();
    assert_eq!(generated, 0, "failures are skipped, not fatal");

    ai.fail_embed.store(false, Ordering::SeqCst);
    let generated = enrichment_service::generate_for_mailbox(&pool, &ai, mailbox.id, 50)
        .await
        .unwrap();
    assert_eq!(generated, 2, "the next tick catches up");
}
