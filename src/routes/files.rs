use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::blobs::{is_legacy_key, key_owner};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/files/{*path}", get(serve))
}

/// Stream a stored blob back to its owner. Admins may read any user's files,
/// and are the only ones who can still reach the legacy `galleries/` tree.
async fn serve(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(path): Path<String>,
) -> AppResult<Response> {
    let allowed = match key_owner(&path) {
        Some(owner) => owner == user.id || user.is_admin,
        None if is_legacy_key(&path) => user.is_admin,
        None => return Err(AppError::NotFound("File not found".into())),
    };
    if !allowed {
        return Err(AppError::Forbidden("You do not have access to this file".into()));
    }

    let bytes = state
        .blobs
        .read(&path)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "private, max-age=86400".to_string()),
        ],
        bytes,
    )
        .into_response())
}
