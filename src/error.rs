use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::AuthError;
use crate::blobs::BlobError;
use crate::docstore::StoreError;
use crate::gallery::GalleryError;
use crate::migration::MigrationError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GalleryError> for AppError {
    fn from(err: GalleryError) -> Self {
        match err {
            GalleryError::InvalidUser => AppError::BadRequest(err.to_string()),
            GalleryError::NotFound(_) => AppError::NotFound(err.to_string()),
            GalleryError::Forbidden => AppError::Forbidden(err.to_string()),
            GalleryError::Invalid(msg) => AppError::BadRequest(msg),
            GalleryError::Store(e) => AppError::Store(e),
            GalleryError::Blob(e) => AppError::Blob(e),
            GalleryError::Json(e) => AppError::Json(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::Unauthorized,
            AuthError::InvalidInput(msg) => AppError::BadRequest(msg),
            AuthError::UsernameTaken => AppError::Conflict(err.to_string()),
            AuthError::Store(e) => AppError::Store(e),
            AuthError::Json(e) => AppError::Json(e),
            AuthError::Hash(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

fn internal(kind: &str, err: &dyn std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("{}: {}", kind, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Blob(BlobError::InvalidKey(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid file path".to_string())
            }
            AppError::Migration(MigrationError::UnknownCollection(name)) => (
                StatusCode::NOT_FOUND,
                format!("Unknown collection: {}", name),
            ),
            AppError::Migration(MigrationError::InvalidUser(user)) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid user id: {:?}", user),
            ),
            AppError::Store(e) => internal("Store error", e),
            AppError::Blob(e) => internal("Blob error", e),
            AppError::Migration(e) => internal("Migration error", e),
            AppError::Json(e) => internal("JSON error", e),
            AppError::Internal(msg) => internal("Internal error", msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(
            response_status(AppError::NotFound("Story not found".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn bad_request_returns_400() {
        assert_eq!(
            response_status(AppError::BadRequest("oops".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_collection_returns_404() {
        let err = AppError::from(MigrationError::UnknownCollection("photos".into()));
        assert_eq!(response_status(err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn gallery_errors_map_to_statuses() {
        assert_eq!(
            response_status(GalleryError::Forbidden.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            response_status(GalleryError::NotFound("Comment").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            response_status(GalleryError::Invalid("too long".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(
            response_status(AuthError::UsernameTaken.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            response_status(AuthError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn body_is_json_error_object() {
        let response = AppError::Conflict("Username is already taken".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Username is already taken");
    }
}
