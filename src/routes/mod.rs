pub mod auth;
pub mod posts;
pub mod uploads;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Everything the server answers, before middleware layers are applied.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .merge(auth::router())
        .merge(posts::router())
        .merge(uploads::router())
}

/// GET / — connectivity check. Clients ping this to find a reachable server.
async fn index() -> Json<serde_json::Value> {
    Json(json!({ "service": "rehome", "status": "ok" }))
}
