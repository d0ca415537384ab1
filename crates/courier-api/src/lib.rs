pub mod error;
pub mod messages;
pub mod users;

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::json;

use courier_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/users/register", post(users::register))
        .route("/api/users/search", get(users::search))
        .route("/api/users/{user_id}", get(users::get_user))
        .route("/api/messages/", post(messages::send_message))
        .route("/api/messages/history", get(messages::get_history))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
