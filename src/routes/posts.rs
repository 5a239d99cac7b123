use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::extractors::{AppJson, CurrentUser};
use crate::state::AppState;
use crate::store::models::{Post, PostStatus};

/// Upload bodies are capped well above any reasonable pet photo.
const UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

// -- Request types --

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatePostRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "animalType")]
    pub category: Option<String>,
    /// Caller-supplied image URL; photo uploads go through /upload instead.
    pub image: Option<String>,
    pub contact: Option<String>,
    pub location: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "animalType")]
    pub category: Option<String>,
    pub contact: Option<String>,
    pub location: Option<String>,
}

// -- Listing handlers --

/// GET /posts — every active listing, newest first. Public: this is the
/// adoption board itself.
async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<Post>>> {
    let mut posts: Vec<Post> = state
        .store
        .posts
        .read()
        .await?
        .into_iter()
        .filter(|p| p.status != PostStatus::Adopted)
        .collect();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(posts))
}

/// GET /my-posts — the caller's active listings, newest first.
async fn my_posts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    owned_posts(&state, &user, PostStatus::Active).await.map(Json)
}

/// GET /my-adopted — the caller's adopted listings, newest first.
async fn my_adopted(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    owned_posts(&state, &user, PostStatus::Adopted).await.map(Json)
}

async fn owned_posts(
    state: &AppState,
    user: &CurrentUser,
    status: PostStatus,
) -> AppResult<Vec<Post>> {
    let mut posts: Vec<Post> = state
        .store
        .posts
        .read()
        .await?
        .into_iter()
        .filter(|p| p.user_id == user.id && p.status == status)
        .collect();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(posts)
}

// -- Creation handlers --

/// POST /posts — create a listing from a JSON body.
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<CreatePostRequest>,
) -> AppResult<Response> {
    let (title, description, category) = required_text_fields(&req)?;
    let post = new_post(
        &user,
        title,
        description,
        category,
        clean(&req.image),
        clean(&req.contact),
        clean(&req.location),
    );

    insert_post(&state, post.clone()).await?;

    tracing::info!("User {} created post {}", user.username, post.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Post created", "post": post })),
    )
        .into_response())
}

/// POST /upload — create a listing from a multipart form carrying a pet
/// photo. The photo is stored under the uploads dir named after the post id,
/// and the post's image field points at its serving path.
async fn upload(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut fields = CreatePostRequest::default();
    let mut image: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let ext = image_extension(field.file_name(), field.content_type())
                    .ok_or_else(|| AppError::BadRequest("Image must be an image file".into()))?;
                let data = field.bytes().await.map_err(bad_multipart)?;
                image = Some((ext, data));
            }
            "title" => fields.title = Some(field.text().await.map_err(bad_multipart)?),
            "description" => fields.description = Some(field.text().await.map_err(bad_multipart)?),
            "category" | "animalType" => {
                fields.category = Some(field.text().await.map_err(bad_multipart)?)
            }
            "contact" => fields.contact = Some(field.text().await.map_err(bad_multipart)?),
            "location" => fields.location = Some(field.text().await.map_err(bad_multipart)?),
            // Clients send extra fields (a locally generated id among them);
            // the server assigns its own.
            _ => {}
        }
    }

    let (title, description, category) = required_text_fields(&fields)?;
    let (ext, data) =
        image.ok_or_else(|| AppError::BadRequest("An image file is required".into()))?;

    let mut post = new_post(
        &user,
        title,
        description,
        category,
        None,
        clean(&fields.contact),
        clean(&fields.location),
    );

    let file_name = format!("{}.{}", post.id, ext);
    let path = state.config.uploads_path().join(&file_name);
    std::fs::write(&path, &data)?;
    post.image = Some(format!("/uploads/{}", file_name));

    insert_post(&state, post.clone()).await?;

    tracing::info!(
        "User {} uploaded post {} ({} bytes)",
        user.username,
        post.id,
        data.len()
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Post created", "post": post })),
    )
        .into_response())
}

// -- Lifecycle handlers --

/// POST /adopt-post/{id} — mark one of the caller's active listings adopted.
async fn adopt_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let adopted_by = user.username.clone();
    let post = transition(&state, &user, &id, PostStatus::Active, move |post, now| {
        post.status = PostStatus::Adopted;
        post.adopted_at = Some(now);
        post.adopted_by = Some(adopted_by);
    })
    .await?;

    tracing::info!("Post {} marked adopted", post.id);
    Ok(Json(json!({ "message": "Post marked as adopted", "post": post })).into_response())
}

/// POST /reactivate-post/{id} — move one of the caller's adopted listings
/// back to the active board. The adoption stamps are cleared outright so the
/// listing carries no trace of the failed adoption.
async fn reactivate_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let post = transition(&state, &user, &id, PostStatus::Adopted, |post, now| {
        post.status = PostStatus::Active;
        post.adopted_at = None;
        post.adopted_by = None;
        post.reactivated_at = Some(now);
    })
    .await?;

    tracing::info!("Post {} reactivated", post.id);
    Ok(Json(json!({ "message": "Post reactivated", "post": post })).into_response())
}

/// PUT /posts/{id} — owner-only partial edit. Works in either lifecycle
/// state; only the fields present in the body change.
async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    // Provided-but-blank core fields are rejected, matching creation.
    for field in [&req.title, &req.description, &req.category] {
        if field.is_some() && clean(field).is_none() {
            return Err(AppError::BadRequest(
                "Title, description and category must not be empty".into(),
            ));
        }
    }

    let post = state
        .store
        .posts
        .update(|posts| {
            let post = posts
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(AppError::NotFound)?;
            if post.user_id != user.id {
                return Err(AppError::Forbidden);
            }

            if let Some(title) = clean(&req.title) {
                post.title = title;
            }
            if let Some(description) = clean(&req.description) {
                post.description = description;
            }
            if let Some(category) = clean(&req.category) {
                post.category = category;
            }
            if req.contact.is_some() {
                post.contact = clean(&req.contact);
            }
            if req.location.is_some() {
                post.location = clean(&req.location);
            }
            post.updated_at = Utc::now();
            Ok(post.clone())
        })
        .await?;

    Ok(Json(post))
}

/// DELETE /posts/{id} and /delete-post/{id} — owner-only removal from either
/// lifecycle state. The record disappears outright; the stored photo is
/// cleaned up best-effort.
async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let removed = state
        .store
        .posts
        .update(|posts| {
            let idx = posts
                .iter()
                .position(|p| p.id == id)
                .ok_or(AppError::NotFound)?;
            if posts[idx].user_id != user.id {
                return Err(AppError::Forbidden);
            }
            Ok(posts.remove(idx))
        })
        .await?;

    if let Some(file) = removed.image.as_deref().and_then(|i| i.strip_prefix("/uploads/")) {
        let path = state.config.uploads_path().join(file);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!("Could not remove image {}: {}", path.display(), e);
        }
    }

    tracing::info!("Post {} deleted", id);
    Ok(Json(json!({ "message": "Post deleted" })).into_response())
}

// -- Helpers --

/// Find a post, enforce ownership, require it to currently sit in
/// `expected`, then apply the change and stamp updatedAt. A post in the
/// wrong state is invisible to the operation, so that reads as 404; only
/// ownership produces 403.
async fn transition<F>(
    state: &AppState,
    user: &CurrentUser,
    id: &str,
    expected: PostStatus,
    apply: F,
) -> AppResult<Post>
where
    F: FnOnce(&mut Post, DateTime<Utc>),
{
    state
        .store
        .posts
        .update(|posts| {
            let post = posts
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(AppError::NotFound)?;
            if post.user_id != user.id {
                return Err(AppError::Forbidden);
            }
            if post.status != expected {
                return Err(AppError::NotFound);
            }
            let now = Utc::now();
            apply(post, now);
            post.updated_at = now;
            Ok(post.clone())
        })
        .await
}

fn new_post(
    user: &CurrentUser,
    title: String,
    description: String,
    category: String,
    image: Option<String>,
    contact: Option<String>,
    location: Option<String>,
) -> Post {
    let now = Utc::now();
    Post {
        id: uuid::Uuid::now_v7().to_string(),
        title,
        description,
        image,
        contact,
        location,
        category,
        status: PostStatus::Active,
        user_id: user.id.clone(),
        username: user.username.clone(),
        created_at: now,
        updated_at: now,
        adopted_at: None,
        adopted_by: None,
        reactivated_at: None,
    }
}

async fn insert_post(state: &AppState, post: Post) -> AppResult<()> {
    state
        .store
        .posts
        .update(move |posts| {
            posts.push(post);
            Ok(())
        })
        .await
}

fn required_text_fields(req: &CreatePostRequest) -> AppResult<(String, String, String)> {
    match (clean(&req.title), clean(&req.description), clean(&req.category)) {
        (Some(title), Some(description), Some(category)) => Ok((title, description, category)),
        _ => Err(AppError::BadRequest(
            "Title, description and category are required".into(),
        )),
    }
}

fn clean(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid multipart body: {}", e))
}

/// Pick the extension the photo is stored, and later served, under. The part
/// must declare an image/* content type; typeless and non-image parts are
/// rejected. The filename extension is honored only when it maps back to an
/// image mime itself, so a misleading name cannot change the served type.
fn image_extension(file_name: Option<&str>, content_type: Option<&str>) -> Option<String> {
    let declared = content_type.filter(|ct| ct.starts_with("image/"))?;

    let from_name = file_name
        .and_then(|n| std::path::Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| {
            mime_guess::from_ext(e)
                .first()
                .map_or(false, |m| m.type_() == mime_guess::mime::IMAGE)
        });

    from_name.or_else(|| match declared {
        "image/jpeg" => Some("jpg".to_string()),
        ct => ct.strip_prefix("image/").map(|s| s.to_ascii_lowercase()),
    })
}

/// Listing router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", put(update_post).delete(delete_post))
        .route("/my-posts", get(my_posts))
        .route("/my-adopted", get(my_adopted))
        .route("/adopt-post/{id}", post(adopt_post))
        .route("/reactivate-post/{id}", post(reactivate_post))
        .route("/delete-post/{id}", delete(delete_post))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extension_prefers_the_file_name() {
        assert_eq!(
            image_extension(Some("rex.JPG"), Some("image/png")),
            Some("jpg".to_string())
        );
    }

    #[test]
    fn image_extension_falls_back_to_content_type() {
        assert_eq!(
            image_extension(Some("photo"), Some("image/png")),
            Some("png".to_string())
        );
        assert_eq!(
            image_extension(None, Some("image/jpeg")),
            Some("jpg".to_string())
        );
    }

    #[test]
    fn image_extension_rejects_non_images() {
        assert_eq!(image_extension(Some("evil.html"), Some("text/html")), None);
        assert_eq!(image_extension(None, Some("application/json")), None);
    }

    #[test]
    fn image_extension_requires_a_declared_type() {
        assert_eq!(image_extension(None, None), None);
        assert_eq!(image_extension(Some("photo"), None), None);
        // A filename alone is not enough, however image-like it looks
        assert_eq!(image_extension(Some("photo.jpg"), None), None);
        assert_eq!(image_extension(Some("evil.html"), None), None);
    }

    #[test]
    fn image_extension_ignores_a_misleading_file_name() {
        assert_eq!(
            image_extension(Some("evil.html"), Some("image/png")),
            Some("png".to_string())
        );
    }

    #[test]
    fn required_text_fields_trims_and_validates() {
        let req = CreatePostRequest {
            title: Some("  Rex  ".to_string()),
            description: Some("Friendly dog".to_string()),
            category: Some("cachorros".to_string()),
            ..Default::default()
        };
        let (title, _, _) = required_text_fields(&req).unwrap();
        assert_eq!(title, "Rex");

        let missing = CreatePostRequest {
            title: Some("Rex".to_string()),
            description: Some("   ".to_string()),
            category: Some("cachorros".to_string()),
            ..Default::default()
        };
        assert!(required_text_fields(&missing).is_err());
    }
}
