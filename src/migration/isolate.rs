use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::{
    IsolationReport, LegacyCollection, MigrationError, MigrationResult, MigrationService,
    OwnerSource, SecurityAnalysis,
};
use crate::blobs::{url_for, BlobError, LEGACY_ROOT, USERS_ROOT};
use crate::docstore::{BatchWriter, CollectionPath, StoreError, WriteOp};

/// Stamp a document for its new per-user home.
fn migrated_fields(
    mut data: Map<String, Value>,
    owner: &str,
    original_id: &str,
    migrated_at: &str,
) -> Map<String, Value> {
    data.insert("userId".into(), Value::String(owner.to_string()));
    data.insert("migratedAt".into(), Value::String(migrated_at.to_string()));
    data.insert("originalId".into(), Value::String(original_id.to_string()));
    data
}

/// `galleries/{owner}/{rest}` -> `users/{owner}/media/{rest}`.
pub(crate) fn isolated_key(legacy_key: &str) -> Option<String> {
    let rest = legacy_key.strip_prefix(LEGACY_ROOT)?.strip_prefix('/')?;
    let (owner, file) = rest.split_once('/')?;
    if owner.is_empty() || file.is_empty() {
        return None;
    }
    Some(format!("{}/{}/media/{}", USERS_ROOT, owner, file))
}

/// Blob key a document points at, from `storagePath` or a `/files/...` url.
fn referenced_key(data: &Map<String, Value>) -> Option<String> {
    if let Some(path) = data.get("storagePath").and_then(Value::as_str) {
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }
    data.get("url")
        .and_then(Value::as_str)
        .and_then(|url| url.strip_prefix("/files/"))
        .map(str::to_string)
}

impl MigrationService {
    pub async fn analyze_security_issues(&self) -> Result<SecurityAnalysis, MigrationError> {
        let mut analysis = SecurityAnalysis::default();
        for kind in LegacyCollection::ALL {
            let count = self.store.count(&kind.global_path()).await?;
            if count > 0 {
                analysis.global_collections.push(kind.name().to_string());
                analysis.unsecured_data += count;
                analysis
                    .risky_operations
                    .push(format!("Cross-user {} access possible", kind.item_noun()));
            }
        }
        tracing::info!(
            "Security analysis: {} global collections holding {} documents",
            analysis.global_collections.len(),
            analysis.unsecured_data
        );
        Ok(analysis)
    }

    /// Move every document of one global collection to its owner's collection.
    ///
    /// Each document is copied to `users/{owner}/{collection}/{id}` and removed
    /// from the global collection in the same batch. Documents whose owner
    /// can't be determined stay where they are and are reported as errors.
    pub async fn migrate_collection(&self, kind: LegacyCollection) -> MigrationResult {
        let mut result = MigrationResult::default();
        let source = kind.global_path();
        tracing::info!("Migrating global {} to per-user collections", kind);

        let docs = match self.store.list(&source).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::error!("Could not read global {}: {}", kind, e);
                result.errors.push(format!("{} migration error: {}", kind, e));
                result.details = format!("Could not read the global {} collection", kind);
                return result;
            }
        };

        let migrated_at = Utc::now().to_rfc3339();
        let mut writer = BatchWriter::new(self.store.as_ref(), self.batch_limit);
        let mut slug_sources: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut failure: Option<StoreError> = None;

        for doc in docs {
            let Some(resolution) = kind.resolve_owner(&doc.data) else {
                tracing::warn!("No owner for {} {}, leaving it in place", kind.item_noun(), doc.id);
                result
                    .errors
                    .push(format!("Could not determine user for {}: {}", kind.item_noun(), doc.id));
                continue;
            };

            let target = match kind.user_path(&resolution.owner) {
                Ok(path) => path,
                Err(_) => {
                    result.errors.push(format!(
                        "Unusable owner {:?} for {}: {}",
                        resolution.owner,
                        kind.item_noun(),
                        doc.id
                    ));
                    continue;
                }
            };

            if let OwnerSource::SlugifiedName(raw) = &resolution.source {
                slug_sources
                    .entry(resolution.owner.clone())
                    .or_default()
                    .insert(raw.clone());
            }

            let data = migrated_fields(doc.data, &resolution.owner, &doc.id, &migrated_at);
            let group = vec![
                WriteOp::Set {
                    path: target,
                    id: doc.id.clone(),
                    data,
                },
                WriteOp::Delete {
                    path: source.clone(),
                    id: doc.id,
                },
            ];
            if let Err(e) = writer.stage(group).await {
                failure = Some(e);
                break;
            }
        }

        if failure.is_none() {
            if let Err(e) = writer.flush().await {
                failure = Some(e);
            }
        }

        result.migrated_items = writer.committed_groups();
        result.batches_committed = writer.commits();
        result.largest_batch = writer.largest_batch();

        for (owner, names) in slug_sources.into_iter().filter(|(_, names)| names.len() > 1) {
            let names: Vec<String> = names.into_iter().collect();
            let warning = format!(
                "Names {} all map to owner {}; their {} were merged",
                names.join(", "),
                owner,
                kind
            );
            tracing::warn!("{}", warning);
            result.warnings.push(warning);
        }

        match failure {
            Some(e) => {
                tracing::error!(
                    "Migration of {} stopped after {} items: {}",
                    kind,
                    result.migrated_items,
                    e
                );
                result.errors.push(format!("{} migration error: {}", kind, e));
                result.details = format!(
                    "Migration of {} stopped after {} items; committed batches were kept",
                    kind, result.migrated_items
                );
            }
            None => {
                result.success = true;
                result.details = format!(
                    "Successfully migrated {} {} to user-isolated collections",
                    result.migrated_items,
                    kind.label()
                );
                tracing::info!(
                    "{} ({} batches, {} unresolved)",
                    result.details,
                    result.batches_committed,
                    result.errors.len()
                );
            }
        }
        result
    }

    /// Media, comments, likes, then stories. A failing collection doesn't
    /// stop the ones after it.
    pub async fn migrate_all_collections(&self) -> MigrationResult {
        let mut results = Vec::with_capacity(LegacyCollection::ALL.len());
        for kind in LegacyCollection::ALL {
            results.push(self.migrate_collection(kind).await);
        }
        MigrationResult::merge(results)
    }

    /// Move legacy files into the per-user layout and repoint the documents
    /// that referenced them.
    pub async fn migrate_storage(&self) -> MigrationResult {
        let mut result = MigrationResult::default();
        tracing::info!("Migrating stored files to user-isolated paths");

        let legacy = match self.blobs.list_legacy().await {
            Ok(legacy) => legacy,
            Err(e) => {
                result.errors.push(format!("Storage migration error: {}", e));
                result.details = "Could not list legacy files".to_string();
                return result;
            }
        };

        let mut moved = 0;
        for (_owner, keys) in legacy {
            for key in keys {
                let Some(target) = isolated_key(&key) else {
                    result.errors.push(format!("Unrecognised legacy file: {}", key));
                    continue;
                };
                match self.blobs.rename(&key, &target).await {
                    Ok(()) => moved += 1,
                    Err(BlobError::AlreadyExists(_)) => {
                        result
                            .errors
                            .push(format!("File already exists at {}; left {} in place", target, key));
                    }
                    Err(e) => result.errors.push(format!("Failed to move {}: {}", key, e)),
                }
            }
        }

        let repointed = match self.repoint_legacy_references().await {
            Ok(repointed) => repointed,
            Err(e) => {
                result.migrated_items = moved;
                result.errors.push(format!("Storage migration error: {}", e));
                result.details = format!(
                    "Moved {} files but could not update the documents referencing them",
                    moved
                );
                return result;
            }
        };

        result.success = true;
        result.migrated_items = moved;
        result.details = format!(
            "Moved {} files to user-isolated paths and updated {} document references",
            moved, repointed
        );
        tracing::info!("{}", result.details);
        result
    }

    /// Rewrite `storagePath`/`url` of media and story documents that still
    /// point into `galleries/` at a file that now exists in the user layout.
    async fn repoint_legacy_references(&self) -> Result<usize, MigrationError> {
        let owners = self.store.list_owners().await?;
        let mut paths = Vec::new();
        for kind in [LegacyCollection::Media, LegacyCollection::Stories] {
            paths.push(kind.global_path());
            for owner in &owners {
                if let Ok(path) = kind.user_path(owner) {
                    paths.push(path);
                }
            }
        }

        let mut writer = BatchWriter::new(self.store.as_ref(), self.batch_limit);
        for path in paths {
            for doc in self.store.list(&path).await? {
                let Some(old_key) = referenced_key(&doc.data) else {
                    continue;
                };
                let Some(new_key) = isolated_key(&old_key) else {
                    continue;
                };
                if !self.blobs.exists(&new_key).await? {
                    continue;
                }

                let mut data = doc.data;
                data.insert("storagePath".into(), Value::String(new_key.clone()));
                data.insert("url".into(), Value::String(url_for(&new_key)));
                writer
                    .stage(vec![WriteOp::Set {
                        path: path.clone(),
                        id: doc.id,
                        data,
                    }])
                    .await?;
            }
        }
        writer.flush().await?;
        Ok(writer.committed_groups())
    }

    /// Count what is left in the global collections and what sits under
    /// `users/*/...`. Succeeds only when every global collection is empty.
    pub async fn validate_data_isolation(&self) -> Result<IsolationReport, MigrationError> {
        let mut report = IsolationReport::default();

        for kind in LegacyCollection::ALL {
            let count = self.store.count(&kind.global_path()).await?;
            report.global_counts.insert(kind.name().to_string(), count);
            if count > 0 {
                report
                    .issues
                    .push(format!("Found {} items in global {} collection", count, kind));
            }
        }

        for owner in self.store.list_owners().await? {
            let mut owned = 0;
            for kind in LegacyCollection::ALL {
                let path = match CollectionPath::user(&owner, kind.name()) {
                    Ok(path) => path,
                    Err(_) => continue,
                };
                let count = self.store.count(&path).await?;
                *report.isolated_counts.entry(kind.name().to_string()).or_default() += count;
                owned += count;
            }
            if owned > 0 {
                report.per_owner.insert(owner, owned);
            }
        }
        report.isolated_total = report.per_owner.values().sum();

        if report.issues.is_empty() {
            report.success = true;
            report.details = format!(
                "Data isolation validation successful. {} items properly isolated in user-specific collections.",
                report.isolated_total
            );
            tracing::info!("{}", report.details);
        } else {
            report.details = format!(
                "Data isolation validation failed. {} items properly isolated, but global collections still contain data.",
                report.isolated_total
            );
            tracing::warn!("{}", report.details);
        }
        Ok(report)
    }
}
