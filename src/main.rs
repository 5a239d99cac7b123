mod auth;
mod config;
mod error;
mod extractors;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Config};
use crate::error::AppResult;
use crate::state::AppState;
use crate::store::models::User;
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Open the JSON-file store
    let store = Store::open(config.store_path())?;

    // Build app state
    let state = AppState {
        store: Arc::new(store),
        config: config.clone(),
    };

    // Build router
    let mut app = routes::build_router();

    // Test-only seed endpoint: creates a user + session, returns the session id
    if std::env::var("REHOME_TEST_SEED").is_ok() {
        app = app.route("/test/seed", get(test_seed));
    }

    // The browser frontend lives on another origin, so CORS stays open.
    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Test-only: seed a user + session and return the session id.
/// Only mounted when REHOME_TEST_SEED env var is set.
async fn test_seed(State(state): State<AppState>) -> AppResult<Response> {
    let existing = state
        .store
        .users
        .read()
        .await?
        .into_iter()
        .find(|u| u.username == "testuser");

    // The user may already exist from a previous seed call
    let user = match existing {
        Some(user) => user,
        None => {
            let user = User {
                id: uuid::Uuid::now_v7().to_string(),
                username: "testuser".to_string(),
                password_hash: auth::password::hash_password("testpass")?,
                phone_number: None,
                is_admin: true,
                created_at: Utc::now(),
            };
            let record = user.clone();
            state
                .store
                .users
                .update(move |users| {
                    users.push(record);
                    Ok(())
                })
                .await?;
            user
        }
    };

    let session =
        auth::session::create_session(&state.store, &user, state.config.auth.session_minutes)
            .await?;

    Ok(Json(json!({ "session_id": session.id, "user": session.user })).into_response())
}
