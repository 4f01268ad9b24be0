use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::auth::PublicAccount;
use crate::error::AppResult;
use crate::extractors::AdminUser;
use crate::gallery::MediaItem;
use crate::migration::{
    IsolationReport, LegacyCollection, MigrationError, MigrationResult, MigrationStatus,
    PipelineReport, SecurityAnalysis, UserMigrationStats,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{uid}/media", get(user_media))
        .route("/api/admin/migration/analysis", get(analyze))
        .route("/api/admin/migration/run", post(run_pipeline))
        .route(
            "/api/admin/migration/collections/{name}",
            post(migrate_collection),
        )
        .route("/api/admin/migration/storage", post(migrate_storage))
        .route("/api/admin/migration/validate", get(validate))
        .route(
            "/api/admin/migration/users/{uid}/status",
            get(user_status),
        )
        .route("/api/admin/migration/users/{uid}", post(migrate_user))
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<PublicAccount>>> {
    let accounts = state.auth.list_accounts().await?;
    Ok(Json(accounts.iter().map(PublicAccount::from).collect()))
}

async fn user_media(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(uid): Path<String>,
) -> AppResult<Json<Vec<MediaItem>>> {
    Ok(Json(state.gallery.list_media(&uid).await?))
}

async fn analyze(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<SecurityAnalysis>> {
    Ok(Json(state.migration.analyze_security_issues().await?))
}

async fn run_pipeline(
    State(state): State<AppState>,
    admin: AdminUser,
) -> AppResult<Json<PipelineReport>> {
    tracing::info!("Migration pipeline started by {}", admin.0.username);
    let report = state
        .migration
        .run_pipeline(state.config.backup_dir())
        .await;
    Ok(Json(report))
}

async fn migrate_collection(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> AppResult<Json<MigrationResult>> {
    let kind = LegacyCollection::parse(&name)
        .ok_or_else(|| MigrationError::UnknownCollection(name.clone()))?;
    Ok(Json(state.migration.migrate_collection(kind).await))
}

async fn migrate_storage(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<MigrationResult>> {
    Ok(Json(state.migration.migrate_storage().await))
}

async fn validate(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<IsolationReport>> {
    Ok(Json(state.migration.validate_data_isolation().await?))
}

async fn user_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(uid): Path<String>,
) -> AppResult<Json<MigrationStatus>> {
    Ok(Json(state.migration.check_migration_status(&uid).await?))
}

async fn migrate_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(uid): Path<String>,
) -> AppResult<Json<UserMigrationStats>> {
    Ok(Json(state.migration.migrate_user_data(&uid).await))
}
