use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::gallery::{ProfileUpdate, UserProfile};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifyCredentialsRequest {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Stored credentials plus whether the access token needs refreshing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifyCredentialsResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/profile", get(get_profile).put(update_profile))
        .route(
            "/api/spotify/credentials",
            get(get_spotify_credentials).put(save_spotify_credentials),
        )
}

async fn get_profile(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<UserProfile>> {
    let profile = state
        .gallery
        .get_profile(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".into()))?;
    Ok(Json(profile))
}

async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ProfileUpdate>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.gallery.update_profile(&user.id, req).await?))
}

async fn get_spotify_credentials(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<SpotifyCredentialsResponse>> {
    let credentials = state
        .gallery
        .get_spotify_credentials(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Spotify is not connected".into()))?;
    let expired = credentials.is_expired(Utc::now());
    Ok(Json(SpotifyCredentialsResponse {
        access_token: credentials.access_token,
        refresh_token: credentials.refresh_token,
        expires_at: credentials.expires_at,
        expired,
    }))
}

async fn save_spotify_credentials(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<SpotifyCredentialsRequest>,
) -> AppResult<Json<SpotifyCredentialsResponse>> {
    let credentials = state
        .gallery
        .save_spotify_credentials(&user.id, &req.access_token, &req.refresh_token, req.expires_at)
        .await?;
    let expired = credentials.is_expired(Utc::now());
    Ok(Json(SpotifyCredentialsResponse {
        access_token: credentials.access_token,
        refresh_token: credentials.refresh_token,
        expires_at: credentials.expires_at,
        expired,
    }))
}
