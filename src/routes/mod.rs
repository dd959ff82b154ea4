use axum::extract::FromRef;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::ai::AiProvider;
use crate::config::Config;
use crate::gmail::MailProvider;
use crate::secretbox::SecretBox;
use crate::services::sync_service::SyncEngine;

pub mod attachments;
pub mod emails;
pub mod kanban;
pub mod mailboxes;
pub mod search;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub provider: Arc<dyn MailProvider>,
    pub ai: Arc<dyn AiProvider>,
    pub secrets: SecretBox,
    pub engine: Arc<SyncEngine>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/mailboxes", get(mailboxes::list))
        .route("/mailboxes/connect", post(mailboxes::connect))
        .route("/mailboxes/:id", get(mailboxes::get_one))
        .route("/mailboxes/:id", delete(mailboxes::remove))
        .route("/mailboxes/:id/sync", post(mailboxes::sync))
        .route("/mailboxes/:id/stats", get(mailboxes::stats))
        .route("/mailboxes/:id/labels", get(mailboxes::labels))
        .route("/emails", get(emails::list))
        .route("/emails/send", post(emails::send))
        .route("/emails/generate-embeddings", post(emails::generate_embeddings))
        .route("/emails/search/fuzzy", get(search::fuzzy))
        .route("/emails/search/semantic", get(search::semantic))
        .route("/emails/search/suggestions", get(search::suggestions))
        .route("/emails/:id", get(emails::get_one))
        .route("/emails/:id", patch(emails::patch_one))
        .route("/emails/:id", delete(emails::remove))
        .route("/emails/:id/summarize", post(emails::summarize))
        .route("/emails/:id/move-to-column", post(emails::move_to_column))
        .route("/emails/:id/generate-embedding", post(emails::generate_embedding))
        .route("/kanban/columns", get(kanban::list))
        .route("/kanban/columns", post(kanban::create))
        .route("/kanban/columns/initialize", post(kanban::initialize))
        .route("/kanban/columns/:id", patch(kanban::update))
        .route("/kanban/columns/:id", delete(kanban::remove))
        .route("/attachments/:id", get(attachments::download));

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/v1", v1)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

pub const MAX_PAGE_SIZE: i64 = 100;

/// Validates the shared `page`/`limit` query surface.
pub fn page_bounds(page: Option<i64>, limit: Option<i64>) -> crate::error::Result<(i64, i64)> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(20);
    if page < 1 {
        return Err(crate::error::Error::validation("page must be >= 1"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(crate::error::Error::validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok((page, limit))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub items_per_page: i64,
    pub total_items: i64,
    pub current_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct PageLinks {
    #[serde(rename = "self")]
    pub self_: String,
    pub first: String,
    pub last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub data: Vec<T>,
    pub meta: PageMeta,
    pub links: PageLinks,
}

pub fn paginate<T: Serialize>(
    data: Vec<T>,
    total_items: i64,
    page: i64,
    limit: i64,
    path: &str,
) -> Paginated<T> {
    let total_pages = if total_items == 0 {
        1
    } else {
        (total_items + limit - 1) / limit
    };
    let link = |p: i64| format!("{path}?page={p}&limit={limit}");
    Paginated {
        data,
        meta: PageMeta {
            items_per_page: limit,
            total_items,
            current_page: page,
            total_pages,
        },
        links: PageLinks {
            self_: link(page),
            first: link(1),
            last: link(total_pages),
            next: (page < total_pages).then(|| link(page + 1)),
            previous: (page > 1).then(|| link(page - 1)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_math() {
        let page = paginate(vec![1, 2, 3], 25, 2, 10, "/v1/emails");
        assert_eq!(page.meta.total_pages, 3);
        assert_eq!(page.links.next.as_deref(), Some("/v1/emails?page=3&limit=10"));
        assert_eq!(page.links.previous.as_deref(), Some("/v1/emails?page=1&limit=10"));

        let empty = paginate(Vec::<i64>::new(), 0, 1, 10, "/v1/emails");
        assert_eq!(empty.meta.total_pages, 1);
        assert!(empty.links.next.is_none());
        assert!(empty.links.previous.is_none());
    }

    #[test]
    fn links_serialize_self_key() {
        let page = paginate(vec![1], 1, 1, 10, "/v1/emails");
        let json = serde_json::to_value(&page).unwrap();
        assert!(json["links"]["self"].is_string());
    }
}
