use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::gallery::{Comment, Like, LikeToggle, MediaItem, Upload};
use crate::state::AppState;

// --- Forms ---

#[derive(Deserialize)]
pub struct CreateNoteRequest {
    pub text: String,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/media", get(list_media).post(upload_media))
        .route("/api/media/notes", post(create_note))
        .route("/api/media/{id}", delete(delete_media))
        .route(
            "/api/media/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/api/comments/{id}", delete(delete_comment))
        .route("/api/media/{id}/likes", get(list_likes).post(toggle_like))
}

/// Read a multipart body with a `file` part and an optional `uploadedBy`
/// text part.
pub(crate) async fn read_upload(mut multipart: Multipart) -> AppResult<(Upload, Option<String>)> {
    let mut upload = None;
    let mut uploaded_by = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&file_name)
                            .first_or_octet_stream()
                            .to_string()
                    });
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                upload = Some(Upload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("uploadedBy") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                let text = text.trim();
                if !text.is_empty() {
                    uploaded_by = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("Missing file".into()))?;
    Ok((upload, uploaded_by))
}

// --- Handlers ---

async fn list_media(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Vec<MediaItem>>> {
    Ok(Json(state.gallery.list_media(&user.id).await?))
}

async fn upload_media(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let (upload, uploaded_by) = read_upload(multipart).await?;
    let uploaded_by = uploaded_by.unwrap_or_else(|| user.display_name.clone());
    let item = state
        .gallery
        .upload_media(&user.id, &uploaded_by, upload)
        .await?;
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

async fn create_note(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateNoteRequest>,
) -> AppResult<Response> {
    let item = state
        .gallery
        .add_note(&user.id, &user.display_name, &req.text)
        .await?;
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

async fn delete_media(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.gallery.delete_media(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_comments(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(media_id): Path<String>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(
        state
            .gallery
            .list_comments(&user.id, Some(&media_id))
            .await?,
    ))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(media_id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<Response> {
    let comment = state
        .gallery
        .add_comment(&user.id, &media_id, &user.display_name, &req.text)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)).into_response())
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.gallery.delete_comment(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_likes(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(media_id): Path<String>,
) -> AppResult<Json<Vec<Like>>> {
    Ok(Json(
        state.gallery.list_likes(&user.id, Some(&media_id)).await?,
    ))
}

async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(media_id): Path<String>,
) -> AppResult<Json<LikeToggle>> {
    Ok(Json(
        state
            .gallery
            .toggle_like(&user.id, &media_id, &user.display_name)
            .await?,
    ))
}
