pub mod admin;
pub mod auth;
pub mod files;
pub mod media;
pub mod music;
pub mod profile;
pub mod stories;
pub mod timeline;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full HTTP surface, bound to `state`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(media::router())
        .merge(stories::router())
        .merge(timeline::router())
        .merge(profile::router())
        .merge(music::router())
        .merge(files::router())
        .merge(admin::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
