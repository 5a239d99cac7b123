use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// GET /uploads/{file} — serve a stored pet photo from the uploads dir.
async fn serve(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    if !safe_file_name(&file) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = state.config.uploads_path().join(&file);
    match std::fs::read(&path) {
        Ok(data) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                data,
            )
                .into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Uploads are stored flat under the uploads dir. Percent-encoded separators
/// decode inside the path segment, so anything that could climb out of the
/// dir is rejected here.
fn safe_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

/// Uploaded photo router
pub fn router() -> Router<AppState> {
    Router::new().route("/uploads/{file}", get(serve))
}
