use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::{page_bounds, paginate, AppState, Paginated};
use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::services::search_service::{
    self, FuzzyParams, ScoredEmail, SearchScope, Suggestions, DEFAULT_FUZZY_THRESHOLD,
    DEFAULT_MIN_SIMILARITY,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuzzyQuery {
    pub q: String,
    pub threshold: Option<f64>,
    pub search_in: Option<String>,
    pub mailbox_id: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub subject_weight: Option<f64>,
    pub sender_weight: Option<f64>,
    pub body_weight: Option<f64>,
}

pub async fn fuzzy(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<FuzzyQuery>,
) -> Result<Json<Paginated<ScoredEmail>>> {
    let (page, limit) = page_bounds(query.page, query.limit)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::validation("threshold must be between 0 and 1"));
    }
    let scope = match query.search_in.as_deref() {
        None => SearchScope::All,
        Some(raw) => SearchScope::parse(raw)
            .ok_or_else(|| Error::validation(format!("unknown searchIn: {raw}")))?,
    };

    let params = FuzzyParams {
        query: query.q.clone(),
        threshold,
        scope,
        mailbox_id: query.mailbox_id,
        page,
        limit,
        subject_weight: query.subject_weight.unwrap_or(0.4),
        sender_weight: query.sender_weight.unwrap_or(0.3),
        body_weight: query.body_weight.unwrap_or(0.3),
    };
    let (data, total) = search_service::fuzzy_search(&state.pool, user_id, &params).await?;
    Ok(Json(paginate(data, total, page, limit, "/v1/emails/search/fuzzy")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticQuery {
    pub q: String,
    pub min_similarity: Option<f64>,
    pub mailbox_id: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn semantic(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<SemanticQuery>,
) -> Result<Json<Paginated<ScoredEmail>>> {
    let (page, limit) = page_bounds(query.page, query.limit)?;
    let min_similarity = query.min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY);
    if !(-1.0..=1.0).contains(&min_similarity) {
        return Err(Error::validation("minSimilarity must be between -1 and 1"));
    }

    let (data, total) = search_service::semantic_search(
        &state.pool,
        state.ai.as_ref(),
        user_id,
        &query.q,
        min_similarity,
        query.mailbox_id,
        page,
        limit,
    )
    .await?;
    Ok(Json(paginate(
        data,
        total,
        page,
        limit,
        "/v1/emails/search/semantic",
    )))
}

#[derive(Deserialize)]
pub struct SuggestionsQuery {
    pub q: String,
}

pub async fn suggestions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<Suggestions>> {
    let suggestions = search_service::suggestions(&state.pool, user_id, &query.q).await?;
    Ok(Json(suggestions))
}
