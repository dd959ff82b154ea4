use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::AppState;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::models::Column;
use crate::services::column_service::{self, CreateColumn, UpdateColumn};

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Column>>> {
    let columns = column_service::list(&state.pool, user_id).await?;
    Ok(Json(columns))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateColumn>,
) -> Result<(StatusCode, Json<Column>)> {
    let column = column_service::create(&state.pool, user_id, body).await?;
    Ok((StatusCode::CREATED, Json(column)))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateColumn>,
) -> Result<Json<Column>> {
    let column = column_service::update(&state.pool, user_id, id, body).await?;
    Ok(Json(column))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    column_service::delete(&state.pool, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn initialize(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<(StatusCode, Json<Vec<Column>>)> {
    let columns = column_service::initialize(&state.pool, user_id).await?;
    Ok((StatusCode::CREATED, Json(columns)))
}
