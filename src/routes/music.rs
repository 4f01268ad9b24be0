use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::gallery::{NewWishlistItem, WishlistItem};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/music/wishlist", get(list_wishlist).post(add_to_wishlist))
        .route("/api/music/wishlist/{id}", delete(remove_from_wishlist))
}

async fn list_wishlist(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<WishlistItem>>> {
    Ok(Json(state.gallery.list_wishlist(&user.id).await?))
}

async fn add_to_wishlist(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewWishlistItem>,
) -> AppResult<Response> {
    let item = state
        .gallery
        .add_wishlist_item(&user.id, &user.display_name, req)
        .await?;
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.gallery.delete_wishlist_item(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
