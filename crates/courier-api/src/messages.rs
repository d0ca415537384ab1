use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::warn;

use courier_db::models::MessageRow;
use courier_types::api::{MessageResponse, SendMessageRequest};

use crate::AppState;
use crate::error::ApiResult;

/// Accept an encrypted message for relay. The server performs no validation
/// of the sender/recipient ids or the payload: iv and ciphertext are opaque,
/// and orphan ids are tolerated rather than checked.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<MessageResponse>> {
    // Run blocking DB insert off the async runtime
    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || {
        db.db
            .insert_message(req.from_id, req.to_id, &req.iv, &req.ciphertext)
    })
    .await??;

    Ok(Json(message_response(row)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: i64,
    pub peer_id: i64,
}

/// Full conversation between two identities, both directions, ascending by
/// creation time. No pagination.
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let db = state.clone();
    let rows =
        tokio::task::spawn_blocking(move || db.db.get_history(query.user_id, query.peer_id))
            .await??;

    Ok(Json(rows.into_iter().map(message_response).collect()))
}

fn message_response(row: MessageRow) -> MessageResponse {
    let created_at = row
        .created_at
        .parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!(
                "Corrupt created_at '{}' on message {}: {}",
                row.created_at, row.id, e
            );
            chrono::DateTime::default()
        });

    MessageResponse {
        id: row.id,
        from_id: row.from_id,
        to_id: row.to_id,
        iv: row.iv,
        ciphertext: row.ciphertext,
        created_at,
    }
}
