use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use courier_db::models::UserRow;
use courier_types::api::{RegisterRequest, UserResponse};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Register a username with a public key. Idempotent: re-registering an
/// existing username returns the existing identity, overwriting the stored
/// key if the caller supplied a different one (last write wins).
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<UserResponse>> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::InvalidInput("Username cannot be empty".into()));
    }

    // Run blocking DB work off the async runtime
    let db = state.clone();
    let public_key = req.public_key;
    let row =
        tokio::task::spawn_blocking(move || db.db.register_user(&username, &public_key)).await??;

    Ok(Json(user_response(row)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let q = query.q.trim().to_string();
    if q.is_empty() {
        return Ok(Json(vec![]));
    }

    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.search_users(&q)).await??;

    Ok(Json(rows.into_iter().map(user_response).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<UserResponse>> {
    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || db.db.get_user_by_id(user_id))
        .await??
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(user_response(row)))
}

fn user_response(row: UserRow) -> UserResponse {
    UserResponse {
        id: row.id,
        username: row.username,
        public_key: row.public_key,
    }
}
