use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::{PublicAccount, Registration};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::gallery::ProfileUpdate;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

fn signed_in(state: &AppState, token: &str, account: &PublicAccount, status: StatusCode) -> Response {
    let body = serde_json::json!({ "token": token, "user": account });
    (
        status,
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(
                &state.config.auth.cookie_name,
                token,
                state.config.auth.session_hours,
            ),
        )]),
        Json(body),
    )
        .into_response()
}

/// POST /api/auth/register: create an account and sign it in
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<Registration>,
) -> AppResult<Response> {
    let account = state.auth.register(req).await?;

    // Seed the profile so the gallery has a display name to show
    state
        .gallery
        .update_profile(
            &account.id,
            ProfileUpdate {
                display_name: Some(account.display_name.clone()),
                ..Default::default()
            },
        )
        .await?;

    let token = state.auth.create_session(&account.id).await?;
    Ok(signed_in(
        &state,
        &token,
        &PublicAccount::from(&account),
        StatusCode::CREATED,
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let account = state.auth.login(&req.username, &req.password).await?;
    let token = state.auth.create_session(&account.id).await?;
    tracing::info!("{} signed in", account.username);
    Ok(signed_in(
        &state,
        &token,
        &PublicAccount::from(&account),
        StatusCode::OK,
    ))
}

/// POST /api/auth/logout: drop the session, if any, and clear the cookie
pub async fn logout(State(state): State<AppState>, user: MaybeUser) -> AppResult<Response> {
    if let MaybeUser(Some(user)) = user {
        if let Err(e) = state.auth.delete_session(&user.token).await {
            tracing::warn!("Failed to delete session for {}: {}", user.username, e);
        }
    }

    Ok((
        StatusCode::OK,
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )]),
        Json(serde_json::json!({ "ok": true })),
    )
        .into_response())
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<serde_json::Value>> {
    let profile = state.gallery.get_profile(&user.id).await?;
    Ok(Json(serde_json::json!({
        "id": user.id,
        "username": user.username,
        "displayName": user.display_name,
        "isAdmin": user.is_admin,
        "profile": profile,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_format() {
        assert_eq!(
            session_cookie("wedding_session", "abc", 24),
            "wedding_session=abc; HttpOnly; SameSite=Strict; Path=/; Max-Age=86400"
        );
        assert!(clear_session_cookie("wedding_session").contains("Max-Age=0"));
    }
}
