use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{LegacyCollection, MigrationError, MigrationService};
use crate::docstore::{BatchWriter, Document, WriteOp};

/// JSON image of the global collections taken before a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub created_at: DateTime<Utc>,
    pub collections: BTreeMap<String, Vec<Document>>,
}

impl Snapshot {
    pub fn document_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub path: PathBuf,
    pub documents: usize,
}

impl MigrationService {
    /// Write every global collection to `dir/backup-<timestamp>.json`.
    pub async fn snapshot_global_collections(&self, dir: &Path) -> Result<BackupSummary, MigrationError> {
        let mut collections = BTreeMap::new();
        for kind in LegacyCollection::ALL {
            let docs = self.store.list(&kind.global_path()).await?;
            collections.insert(kind.name().to_string(), docs);
        }
        let snapshot = Snapshot {
            created_at: Utc::now(),
            collections,
        };

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "backup-{}.json",
            snapshot.created_at.format("%Y%m%dT%H%M%S%.3fZ")
        ));
        let body = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(&path, body).await?;

        let documents = snapshot.document_count();
        tracing::info!("Wrote backup of {} documents to {}", documents, path.display());
        Ok(BackupSummary { path, documents })
    }

    /// Put every document of a snapshot back into its global collection.
    /// Documents that exist again are overwritten. Returns how many were
    /// restored.
    pub async fn restore_snapshot(&self, path: &Path) -> Result<usize, MigrationError> {
        let body = tokio::fs::read(path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&body)?;

        let mut restores = Vec::new();
        for (name, docs) in snapshot.collections {
            let kind = LegacyCollection::parse(&name)
                .ok_or_else(|| MigrationError::InvalidSnapshot(format!("unknown collection {}", name)))?;
            restores.push((kind, docs));
        }

        let mut writer = BatchWriter::new(self.store.as_ref(), self.batch_limit);
        for (kind, docs) in restores {
            let target = kind.global_path();
            for doc in docs {
                writer
                    .stage(vec![WriteOp::Set {
                        path: target.clone(),
                        id: doc.id,
                        data: doc.data,
                    }])
                    .await?;
            }
        }
        writer.flush().await?;

        let restored = writer.committed_groups();
        tracing::info!("Restored {} documents from {}", restored, path.display());
        Ok(restored)
    }
}
