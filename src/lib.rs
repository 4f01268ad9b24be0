// Library exports for the wedding gallery
// Integration tests drive the router and services through these modules

pub mod auth;
pub mod blobs;
pub mod config;
pub mod db;
pub mod docstore;
pub mod error;
pub mod extractors;
pub mod gallery;
pub mod migration;
pub mod routes;
pub mod state;

use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::docstore::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
use crate::state::AppState;

/// Open the configured document store and wire the services around it.
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    let store: Arc<dyn DocumentStore> = match config.database.backend {
        StoreBackend::Sqlite => {
            let pool = db::create_pool(config.db_path())?;
            db::run_migrations(&pool)?;
            Arc::new(SqliteDocumentStore::new(pool))
        }
        StoreBackend::Memory => Arc::new(MemoryDocumentStore::new()),
    };
    std::fs::create_dir_all(config.uploads_path())?;
    Ok(AppState::new(store, config))
}
