use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::gallery::{group_stories_by_uploader, Story, UserStories};
use crate::routes::media::read_upload;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stories", get(list_stories).post(upload_story))
        .route("/api/stories/grouped", get(grouped_stories))
        .route("/api/stories/{id}", delete(delete_story))
}

async fn list_stories(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Vec<Story>>> {
    Ok(Json(
        state
            .gallery
            .list_active_stories(&user.id, Utc::now())
            .await?,
    ))
}

async fn grouped_stories(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<UserStories>>> {
    let stories = state
        .gallery
        .list_active_stories(&user.id, Utc::now())
        .await?;
    Ok(Json(group_stories_by_uploader(stories)))
}

async fn upload_story(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let (upload, uploaded_by) = read_upload(multipart).await?;
    let uploaded_by = uploaded_by.unwrap_or_else(|| user.display_name.clone());
    let story = state
        .gallery
        .upload_story(&user.id, &uploaded_by, upload)
        .await?;
    Ok((StatusCode::CREATED, Json(story)).into_response())
}

async fn delete_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.gallery.delete_story(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
