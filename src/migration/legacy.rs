//! Per-user copy migration.
//!
//! Older clients migrated one signed-in user at a time: every global document
//! that names the user in one of a few identity fields is copied (not moved)
//! into `users/{uid}/...`. The global originals are left for the full
//! isolation run to remove.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::owner::{id_value, ANONYMOUS, WEB_CLIENT_DEVICE};
use super::{LegacyCollection, MigrationError, MigrationService};
use crate::docstore::{validate_segment, BatchWriter, WriteOp};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMigrationStats {
    pub user_id: String,
    pub media_items_migrated: usize,
    pub comments_migrated: usize,
    pub likes_migrated: usize,
    pub stories_migrated: usize,
    pub errors: Vec<String>,
}

impl UserMigrationStats {
    fn record(&mut self, kind: LegacyCollection, count: usize) {
        match kind {
            LegacyCollection::Media => self.media_items_migrated = count,
            LegacyCollection::Comments => self.comments_migrated = count,
            LegacyCollection::Likes => self.likes_migrated = count,
            LegacyCollection::Stories => self.stories_migrated = count,
        }
    }

    pub fn total(&self) -> usize {
        self.media_items_migrated + self.comments_migrated + self.likes_migrated + self.stories_migrated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub has_secure_data: bool,
    pub has_legacy_data: bool,
    pub migration_needed: bool,
}

/// Identity fields a legacy document can name its user in.
fn identity_fields(kind: LegacyCollection) -> &'static [&'static str] {
    match kind {
        LegacyCollection::Media | LegacyCollection::Stories => &["deviceId", "uploadedBy", "userId"],
        LegacyCollection::Comments | LegacyCollection::Likes => &["deviceId", "userName"],
    }
}

fn names_user(data: &Map<String, Value>, fields: &[&str], user_id: &str) -> bool {
    fields.iter().any(|field| {
        data.get(*field)
            .and_then(id_value)
            .is_some_and(|value| value == user_id)
    })
}

impl MigrationService {
    /// Copy every global document belonging to `user_id` into the user's own
    /// collections. Copies keep the original id, so running this twice does
    /// not duplicate anything.
    pub async fn migrate_user_data(&self, user_id: &str) -> UserMigrationStats {
        let mut stats = UserMigrationStats {
            user_id: user_id.to_string(),
            ..Default::default()
        };
        if let Err(e) = validate_segment(user_id) {
            stats.errors.push(format!("Migration failed: {}", e));
            return stats;
        }

        tracing::info!("Copying legacy data for user {}", user_id);
        let migrated_at = Utc::now().to_rfc3339();

        for kind in LegacyCollection::ALL {
            match self.copy_user_collection(kind, user_id, &migrated_at).await {
                Ok(count) => stats.record(kind, count),
                Err((count, e)) => {
                    stats.record(kind, count);
                    let message = format!("{} migration failed: {}", kind, e);
                    tracing::warn!("{} (user {})", message, user_id);
                    stats.errors.push(message);
                }
            }
        }

        tracing::info!(
            "Copied {} legacy documents for user {} ({} errors)",
            stats.total(),
            user_id,
            stats.errors.len()
        );
        stats
    }

    /// On failure returns how many documents were committed before it.
    async fn copy_user_collection(
        &self,
        kind: LegacyCollection,
        user_id: &str,
        migrated_at: &str,
    ) -> Result<usize, (usize, MigrationError)> {
        let target = kind.user_path(user_id).map_err(|e| (0, e.into()))?;
        let docs = self
            .store
            .list(&kind.global_path())
            .await
            .map_err(|e| (0, e.into()))?;

        let fields = identity_fields(kind);
        let mut writer = BatchWriter::new(self.store.as_ref(), self.batch_limit);
        for doc in docs.into_iter().filter(|doc| names_user(&doc.data, fields, user_id)) {
            let mut data = doc.data;
            data.insert("userId".into(), Value::String(user_id.to_string()));
            data.insert("migratedAt".into(), Value::String(migrated_at.to_string()));
            data.insert("originalId".into(), Value::String(doc.id.clone()));

            let op = WriteOp::Set {
                path: target.clone(),
                id: doc.id,
                data,
            };
            if let Err(e) = writer.stage(vec![op]).await {
                return Err((writer.committed_groups(), e.into()));
            }
        }
        if let Err(e) = writer.flush().await {
            return Err((writer.committed_groups(), e.into()));
        }
        Ok(writer.committed_groups())
    }

    /// Every identity a legacy document mentions. The shared web client id
    /// and the anonymous name are not identities.
    pub async fn discover_legacy_user_ids(&self) -> Result<Vec<String>, MigrationError> {
        let mut ids = BTreeSet::new();
        for kind in LegacyCollection::ALL {
            for doc in self.store.list(&kind.global_path()).await? {
                for field in identity_fields(kind) {
                    if let Some(value) = doc.data.get(*field).and_then(id_value) {
                        if value != WEB_CLIENT_DEVICE && value != ANONYMOUS {
                            ids.insert(value);
                        }
                    }
                }
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Run [`MigrationService::migrate_user_data`] for every discovered id.
    /// One user failing doesn't stop the others.
    pub async fn migrate_all_users(&self) -> Result<Vec<UserMigrationStats>, MigrationError> {
        let user_ids = self.discover_legacy_user_ids().await?;
        tracing::info!("Found {} unique users to migrate", user_ids.len());

        let mut all = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            all.push(self.migrate_user_data(&user_id).await);
        }
        Ok(all)
    }

    pub async fn check_migration_status(&self, user_id: &str) -> Result<MigrationStatus, MigrationError> {
        let secure = LegacyCollection::Media
            .user_path(user_id)
            .map_err(|_| MigrationError::InvalidUser(user_id.to_string()))?;
        let has_secure_data = self.store.count(&secure).await? > 0;

        let has_legacy_data = self
            .store
            .list(&LegacyCollection::Media.global_path())
            .await?
            .iter()
            .any(|doc| names_user(&doc.data, &["deviceId", "uploadedBy"], user_id));

        Ok(MigrationStatus {
            has_secure_data,
            has_legacy_data,
            migration_needed: has_legacy_data && !has_secure_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::BlobStore;
    use crate::docstore::{CollectionPath, DocumentStore, MemoryDocumentStore};
    use serde_json::json;
    use std::sync::Arc;

    async fn seeded() -> (MigrationService, Arc<MemoryDocumentStore>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryDocumentStore::new());
        let media = CollectionPath::global("media");
        let comments = CollectionPath::global("comments");
        for (id, data) in [
            ("m1", json!({ "deviceId": "dev1", "uploadedBy": "Jane" })),
            ("m2", json!({ "deviceId": "web-client", "uploadedBy": "dev1" })),
            ("m3", json!({ "deviceId": "dev2", "uploadedBy": "Bob" })),
        ] {
            store
                .set(&media, id, data.as_object().unwrap().clone())
                .await
                .unwrap();
        }
        store
            .set(
                &comments,
                "c1",
                json!({ "deviceId": "dev1", "userName": "Jane", "mediaId": "m3" })
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .await
            .unwrap();

        let service = MigrationService::new(store.clone(), BlobStore::new(tmp.path()));
        (service, store, tmp)
    }

    #[tokio::test]
    async fn copies_matching_documents_and_keeps_originals() {
        let (service, store, _tmp) = seeded().await;

        let stats = service.migrate_user_data("dev1").await;
        assert!(stats.errors.is_empty(), "{:?}", stats.errors);
        assert_eq!(stats.media_items_migrated, 2);
        assert_eq!(stats.comments_migrated, 1);
        assert_eq!(stats.total(), 3);

        let copy = store
            .get(&CollectionPath::user("dev1", "media").unwrap(), "m2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copy.str_field("userId"), Some("dev1"));
        assert_eq!(copy.str_field("originalId"), Some("m2"));
        assert_eq!(store.count(&CollectionPath::global("media")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate() {
        let (service, store, _tmp) = seeded().await;
        service.migrate_user_data("dev1").await;
        service.migrate_user_data("dev1").await;
        assert_eq!(
            store
                .count(&CollectionPath::user("dev1", "media").unwrap())
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn discovery_skips_shared_identities() {
        let (service, _store, _tmp) = seeded().await;
        let ids = service.discover_legacy_user_ids().await.unwrap();
        assert_eq!(ids, vec!["Bob", "Jane", "dev1", "dev2"]);
    }

    #[tokio::test]
    async fn status_reflects_copy() {
        let (service, _store, _tmp) = seeded().await;
        let before = service.check_migration_status("dev2").await.unwrap();
        assert_eq!(
            before,
            MigrationStatus {
                has_secure_data: false,
                has_legacy_data: true,
                migration_needed: true
            }
        );

        service.migrate_user_data("dev2").await;
        let after = service.check_migration_status("dev2").await.unwrap();
        assert!(after.has_secure_data);
        assert!(!after.migration_needed);
    }

    #[tokio::test]
    async fn invalid_user_id_is_reported() {
        let (service, _store, _tmp) = seeded().await;
        let stats = service.migrate_user_data("../etc").await;
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.errors.len(), 1);
        assert!(service.check_migration_status("a/b").await.is_err());
    }
}
