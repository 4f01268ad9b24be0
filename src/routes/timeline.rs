use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::gallery::{NewTimelineEvent, TimelineEvent, TimelineEventUpdate};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/timeline", get(list_events).post(create_event))
        .route("/api/timeline/{id}", put(update_event).delete(delete_event))
}

async fn list_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<TimelineEvent>>> {
    Ok(Json(state.gallery.list_timeline(&user.id).await?))
}

async fn create_event(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewTimelineEvent>,
) -> AppResult<Response> {
    let event = state
        .gallery
        .create_timeline_event(&user.id, &user.display_name, req)
        .await?;
    Ok((StatusCode::CREATED, Json(event)).into_response())
}

async fn update_event(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<TimelineEventUpdate>,
) -> AppResult<Json<TimelineEvent>> {
    Ok(Json(
        state
            .gallery
            .update_timeline_event(&user.id, &id, req)
            .await?,
    ))
}

async fn delete_event(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.gallery.delete_timeline_event(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
