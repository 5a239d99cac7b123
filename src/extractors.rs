use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;

use crate::auth::session;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, resolved from the session store.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// Extractor that requires a live session.
/// Returns 401 when the header is missing or malformed, the token is
/// unknown, or the session has expired. Extraction renews the session's
/// sliding expiry as a side effect.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(parts)
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let session = session::authenticate(&state.store, &token, state.config.auth.session_minutes)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser {
            id: session.user.id,
            username: session.user.username,
        })
    }
}

/// The raw session token from the Authorization header, without touching the
/// session store. Handlers that manage the session record itself (logout,
/// session-info) start from this.
pub struct SessionToken(pub String);

impl FromRequestParts<AppState> for SessionToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_token(parts)
            .map(|token| SessionToken(token.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

/// JSON body extractor that keeps extraction failures in the API's error
/// shape. The stock extractor answers malformed bodies with plain text;
/// mapping its rejection through `AppError` keeps every error body
/// `{"error": ...}`, which is what clients read.
pub struct AppJson<T>(pub T);

impl<T> FromRequest<AppState> for AppJson<T>
where
    T: serde::de::DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(AppJson(value))
    }
}

/// Pull the token out of `Authorization: Session <id>`. `Bearer` is accepted
/// too; earlier clients sent that scheme.
fn extract_session_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("session") && !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn parts_without_auth() -> Parts {
        let (parts, _) = Request::builder().body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn session_scheme_is_accepted() {
        let parts = parts_with_auth("Session abc123");
        assert_eq!(extract_session_token(&parts), Some("abc123"));
    }

    #[test]
    fn bearer_scheme_is_accepted() {
        let parts = parts_with_auth("Bearer abc123");
        assert_eq!(extract_session_token(&parts), Some("abc123"));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let parts = parts_with_auth("session abc123");
        assert_eq!(extract_session_token(&parts), Some("abc123"));
    }

    #[test]
    fn missing_header_yields_none() {
        let parts = parts_without_auth();
        assert_eq!(extract_session_token(&parts), None);
    }

    #[test]
    fn unknown_scheme_yields_none() {
        let parts = parts_with_auth("Basic abc123");
        assert_eq!(extract_session_token(&parts), None);
    }

    #[test]
    fn scheme_without_token_yields_none() {
        assert_eq!(extract_session_token(&parts_with_auth("Session")), None);
        assert_eq!(extract_session_token(&parts_with_auth("Session   ")), None);
    }
}
