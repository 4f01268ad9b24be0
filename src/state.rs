use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::AuthService;
use crate::blobs::BlobStore;
use crate::config::Config;
use crate::docstore::DocumentStore;
use crate::gallery::GalleryStore;
use crate::migration::MigrationService;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: BlobStore,
    pub gallery: GalleryStore,
    pub auth: AuthService,
    pub migration: MigrationService,
    pub config: Config,
}

impl AppState {
    /// Wire every service to the one injected store.
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        let blobs = BlobStore::new(config.uploads_path());
        let gallery = GalleryStore::new(store.clone(), blobs.clone(), config.story_ttl());
        let auth = AuthService::new(
            store.clone(),
            config.auth.session_hours,
            config.auth.bcrypt_cost,
        );
        let migration = MigrationService::new(store.clone(), blobs.clone())
            .with_batch_limit(config.migration.batch_limit);
        Self {
            store,
            blobs,
            gallery,
            auth,
            migration,
            config,
        }
    }
}
