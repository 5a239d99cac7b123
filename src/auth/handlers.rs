use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{password, session};
use crate::error::{AppError, AppResult};
use crate::extractors::{AppJson, SessionToken};
use crate::state::AppState;
use crate::store::models::User;

// -- Request types --

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub phone_number: Option<String>,
    pub is_admin: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

// -- Handlers --

/// POST /register — create an account. Registration does not log the user
/// in; clients follow up with /login.
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<Response> {
    let username = clean(&req.username);
    // The password must have substance, but it is hashed exactly as sent;
    // login verifies against the raw value too.
    let password = req.password.as_deref().filter(|p| !p.trim().is_empty());
    let (Some(username), Some(password)) = (username, password) else {
        return Err(AppError::BadRequest(
            "Username and password are required".into(),
        ));
    };

    let user = User {
        id: uuid::Uuid::now_v7().to_string(),
        username: username.clone(),
        password_hash: password::hash_password(password)?,
        phone_number: clean(&req.phone_number),
        is_admin: req.is_admin,
        created_at: Utc::now(),
    };

    state
        .store
        .users
        .update(move |users| {
            // Usernames are unique and case-sensitive.
            if users.iter().any(|u| u.username == user.username) {
                return Err(AppError::BadRequest("User already exists".into()));
            }
            users.push(user);
            Ok(())
        })
        .await?;

    tracing::info!("Registered user {}", username);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered" })),
    )
        .into_response())
}

/// POST /login — verify credentials and mint a session.
///
/// Unknown usernames and wrong passwords are indistinguishable to the
/// caller: both come back 401 with the same body.
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<Response> {
    let (Some(username), Some(password)) = (
        req.username.as_deref().filter(|u| !u.is_empty()),
        req.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Username and password are required".into(),
        ));
    };

    let user = state
        .store
        .users
        .read()
        .await?
        .into_iter()
        .find(|u| u.username == username);

    let Some(user) = user else {
        return Err(AppError::InvalidCredentials);
    };
    if !password::verify_password(password, &user.password_hash) {
        return Err(AppError::InvalidCredentials);
    }

    let session =
        session::create_session(&state.store, &user, state.config.auth.session_minutes).await?;

    tracing::info!("User {} logged in", user.username);
    Ok(Json(json!({
        "session_id": session.id,
        "user": session.user,
    }))
    .into_response())
}

/// POST /logout — delete the caller's session record. Works for expired
/// sessions too, so a stale client can always clean up after itself.
pub async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> AppResult<Response> {
    session::delete_session(&state.store, &token).await?;
    Ok(Json(json!({ "message": "Logged out" })).into_response())
}

/// GET /session-info — authenticate and report the session plus remaining
/// lifetime in seconds. Authentication renews the sliding expiry, so this
/// doubles as the client's keep-alive call.
pub async fn session_info(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> AppResult<Response> {
    let session =
        session::authenticate(&state.store, &token, state.config.auth.session_minutes)
            .await?
            .ok_or(AppError::Unauthorized)?;

    let time_remaining = (session.expires_at - Utc::now()).num_seconds().max(0);

    Ok(Json(json!({
        "user": session.user,
        "session": {
            "created_at": session.created_at,
            "expires_at": session.expires_at,
            "last_activity": session.last_activity,
            "time_remaining": time_remaining,
        },
    }))
    .into_response())
}

fn clean(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
