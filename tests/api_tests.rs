mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use common::{parsed, secrets, seed_mailbox, seed_user, setup_pool, MockAi, MockProvider, TEST_KEY};
use mailboard::auth::issue_access_token;
use mailboard::config::Config;
use mailboard::db::messages;
use mailboard::routes::{self, AppState};
use mailboard::services::sync_service::SyncEngine;

const SECRET: &str = "api-test-secret";
const AUDIENCE: &str = "mailboard";
const ISSUER: &str = "mailboard";

fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".into(),
        port: 0,
        google_client_id: "client".into(),
        google_client_secret: "secret".into(),
        google_redirect_uri: "http://localhost/callback".into(),
        encryption_key: TEST_KEY,
        access_token_secret: SECRET.into(),
        access_token_audience: AUDIENCE.into(),
        access_token_issuer: ISSUER.into(),
        ai_api_key: "key".into(),
        ai_api_base: "http://localhost".into(),
        ai_embedding_model: "embed".into(),
        ai_chat_model: "chat".into(),
    }
}

async fn app() -> (axum::Router, sqlx::SqlitePool, i64, i64, Arc<MockProvider>) {
    let pool = setup_pool().await;
    let user_id = seed_user(&pool).await;
    let mailbox = seed_mailbox(&pool, user_id).await;

    let provider = Arc::new(MockProvider::new("H1"));
    let engine = Arc::new(SyncEngine::new(pool.clone(), provider.clone(), secrets()));
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(test_config()),
        provider: provider.clone(),
        ai: Arc::new(MockAi::default()),
        secrets: secrets(),
        engine,
    };
    (routes::router(state), pool, user_id, mailbox.id, provider)
}

fn bearer(user_id: i64) -> String {
    format!(
        "Bearer {}",
        issue_access_token(user_id, SECRET, AUDIENCE, ISSUER, 300).unwrap()
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let (app, ..) = app().await;
    let response = app
        .oneshot(Request::get("/v1/emails").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn healthz_is_open() {
    let (app, ..) = app().await;
    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn email_listing_is_paginated() {
    let (app, pool, user_id, mailbox_id, _) = app().await;
    for i in 0..3 {
        messages::upsert_parsed(&pool, mailbox_id, &parsed(&format!("M{i}"), "hello", &["INBOX"]))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(
            Request::get("/v1/emails?page=1&limit=2")
                .header(header::AUTHORIZATION, bearer(user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
    assert_eq!(json["meta"]["totalItems"], 3);
    assert_eq!(json["meta"]["totalPages"], 2);
    assert!(json["links"]["self"].is_string());
    assert!(json["links"]["next"].is_string());
    // the summary view drops bodies
    assert!(json["data"][0].get("bodyText").is_none());
}

#[tokio::test]
async fn email_listing_rejects_out_of_range_limit() {
    let (app, _, user_id, _, _) = app().await;
    let response = app
        .oneshot(
            Request::get("/v1/emails?limit=500")
                .header(header::AUTHORIZATION, bearer(user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patching_read_state_keeps_labels_consistent() {
    let (app, pool, user_id, mailbox_id, _) = app().await;
    let outcome =
        messages::upsert_parsed(&pool, mailbox_id, &parsed("M1", "hello", &["INBOX", "UNREAD"]))
            .await
            .unwrap();

    let response = app
        .oneshot(
            Request::patch(format!("/v1/emails/{}", outcome.email_id))
                .header(header::AUTHORIZATION, bearer(user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"isRead": true}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let email = messages::find(&pool, outcome.email_id).await.unwrap().unwrap();
    assert!(email.is_read);
    assert!(!email.labels.iter().any(|l| l == "UNREAD"));

    let mailbox = mailboard::db::mailboxes::find(&pool, mailbox_id).await.unwrap().unwrap();
    assert_eq!(mailbox.unread_count, 0);
}

#[tokio::test]
async fn patching_snooze_null_unsnoozes() {
    let (app, pool, user_id, mailbox_id, _) = app().await;
    let outcome = messages::upsert_parsed(&pool, mailbox_id, &parsed("M1", "hello", &["INBOX"]))
        .await
        .unwrap();

    let until = (chrono::Utc::now() + chrono::Duration::hours(2)).to_rfc3339();
    let response = app
        .clone()
        .oneshot(
            Request::patch(format!("/v1/emails/{}", outcome.email_id))
                .header(header::AUTHORIZATION, bearer(user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(format!(r#"{{"snoozedUntil": "{until}"}}"#)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let email = messages::find(&pool, outcome.email_id).await.unwrap().unwrap();
    assert!(email.is_snoozed);

    let response = app
        .oneshot(
            Request::patch(format!("/v1/emails/{}", outcome.email_id))
                .header(header::AUTHORIZATION, bearer(user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"snoozedUntil": null}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let email = messages::find(&pool, outcome.email_id).await.unwrap().unwrap();
    assert!(!email.is_snoozed);
    assert!(email.snoozed_until.is_none());
}

#[tokio::test]
async fn foreign_emails_read_as_missing() {
    let (app, pool, _, mailbox_id, _) = app().await;
    let outcome = messages::upsert_parsed(&pool, mailbox_id, &parsed("M1", "hello", &["INBOX"]))
        .await
        .unwrap();
    let other = mailboard::db::users::create(&pool, "other@example.com", "O", "U", "local", None)
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::get(format!("/v1/emails/{}", outcome.email_id))
                .header(header::AUTHORIZATION, bearer(other.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn kanban_initialize_returns_created() {
    let (app, _, user_id, _, _) = app().await;
    let response = app
        .oneshot(
            Request::post("/v1/kanban/columns/initialize")
                .header(header::AUTHORIZATION, bearer(user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn duplicate_column_title_maps_to_conflict() {
    let (app, _, user_id, _, _) = app().await;
    let request = |app: axum::Router| async move {
        app.oneshot(
            Request::post("/v1/kanban/columns")
                .header(header::AUTHORIZATION, bearer(user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"title": "Waiting"}"#))
                .unwrap(),
        )
        .await
        .unwrap()
    };
    let first = request(app.clone()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = request(app).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn sync_endpoint_accepts_and_returns_202() {
    let (app, _, user_id, mailbox_id, _) = app().await;
    let response = app
        .oneshot(
            Request::post(format!("/v1/mailboxes/{mailbox_id}/sync"))
                .header(header::AUTHORIZATION, bearer(user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn mailbox_stats_cover_system_labels() {
    let (app, pool, user_id, mailbox_id, _) = app().await;
    messages::upsert_parsed(&pool, mailbox_id, &parsed("M1", "hi", &["INBOX", "UNREAD"]))
        .await
        .unwrap();
    messages::upsert_parsed(&pool, mailbox_id, &parsed("M2", "sent", &["SENT"]))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::get(format!("/v1/mailboxes/{mailbox_id}/stats"))
                .header(header::AUTHORIZATION, bearer(user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["inbox"]["total"], 1);
    assert_eq!(json["inbox"]["unread"], 1);
    assert_eq!(json["sent"]["total"], 1);
    assert_eq!(json["sent"]["unread"], 0);
    assert_eq!(json["trash"]["total"], 0);
}

#[tokio::test]
async fn fuzzy_route_validates_threshold() {
    let (app, _, user_id, _, _) = app().await;
    let response = app
        .oneshot(
            Request::get("/v1/emails/search/fuzzy?q=test&threshold=2.0")
                .header(header::AUTHORIZATION, bearer(user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_email_goes_through_the_provider() {
    let (app, _, user_id, mailbox_id, provider) = app().await;
    let payload = format!(
        r#"{{"mailboxId": {mailbox_id}, "to": ["you@example.com"], "subject": "hi", "body": "text"}}"#
    );
    let response = app
        .oneshot(
            Request::post("/v1/emails/send")
                .header(header::AUTHORIZATION, bearer(user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["messageId"], "sent-1");
    let sent = provider.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, "user@gmail.com");
}
