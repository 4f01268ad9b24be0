//! Migration of the legacy global collections into per-user collections.
//!
//! Legacy deployments kept every guest's uploads in four shared collections
//! (`media`, `comments`, `likes`, `stories`) with no owner boundary. The
//! [`MigrationService`] moves each document to `users/{owner}/{collection}`,
//! moves stored files from `galleries/{owner}/...` to `users/{owner}/media/...`
//! and checks the result.

mod backup;
mod isolate;
mod legacy;
pub mod owner;
mod pipeline;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::blobs::{BlobError, BlobStore};
use crate::docstore::{CollectionPath, DocumentStore, StoreError, DEFAULT_BATCH_LIMIT};
use serde_json::{Map, Value};

pub use self::backup::{BackupSummary, Snapshot};
pub use self::legacy::{MigrationStatus, UserMigrationStats};
pub use self::owner::{OwnerResolution, OwnerSource};
pub use self::pipeline::{PipelineReport, StepId, StepReport, StepStatus};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Invalid user id: {0:?}")]
    InvalidUser(String),
}

/// One of the four shared collections from before per-user isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyCollection {
    Media,
    Comments,
    Likes,
    Stories,
}

impl LegacyCollection {
    /// Migration order.
    pub const ALL: [LegacyCollection; 4] = [
        LegacyCollection::Media,
        LegacyCollection::Comments,
        LegacyCollection::Likes,
        LegacyCollection::Stories,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LegacyCollection::Media => "media",
            LegacyCollection::Comments => "comments",
            LegacyCollection::Likes => "likes",
            LegacyCollection::Stories => "stories",
        }
    }

    /// Singular noun used in per-item messages.
    pub fn item_noun(self) -> &'static str {
        match self {
            LegacyCollection::Media => "media",
            LegacyCollection::Comments => "comment",
            LegacyCollection::Likes => "like",
            LegacyCollection::Stories => "story",
        }
    }

    fn label(self) -> &'static str {
        match self {
            LegacyCollection::Media => "media items",
            other => other.name(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn global_path(self) -> CollectionPath {
        CollectionPath::global(self.name())
    }

    pub fn user_path(self, owner: &str) -> Result<CollectionPath, StoreError> {
        CollectionPath::user(owner, self.name())
    }

    /// Apply the owner heuristic that fits this collection's documents.
    pub fn resolve_owner(self, data: &Map<String, Value>) -> Option<OwnerResolution> {
        match self {
            LegacyCollection::Media | LegacyCollection::Stories => owner::resolve_media_owner(data),
            LegacyCollection::Comments | LegacyCollection::Likes => {
                owner::resolve_comment_owner(data)
            }
        }
    }
}

impl fmt::Display for LegacyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one migration operation. Per-item problems land in `errors`
/// without failing the whole operation; `success` is false only when the
/// operation itself could not finish.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub success: bool,
    pub migrated_items: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub details: String,
    pub batches_committed: usize,
    pub largest_batch: usize,
}

impl MigrationResult {
    pub fn merge(results: Vec<MigrationResult>) -> MigrationResult {
        let mut merged = MigrationResult {
            success: true,
            ..Default::default()
        };
        let mut details = Vec::new();
        for result in results {
            merged.success &= result.success;
            merged.migrated_items += result.migrated_items;
            merged.errors.extend(result.errors);
            merged.warnings.extend(result.warnings);
            merged.batches_committed += result.batches_committed;
            merged.largest_batch = merged.largest_batch.max(result.largest_batch);
            if !result.details.is_empty() {
                details.push(result.details);
            }
        }
        merged.details = details.join("; ");
        merged
    }

    /// Details with the error list appended, for one-line reporting.
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            self.details.clone()
        } else {
            format!("{} - Errors: {}", self.details, self.errors.join(", "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAnalysis {
    pub global_collections: Vec<String>,
    pub unsecured_data: usize,
    pub risky_operations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationReport {
    pub success: bool,
    pub global_counts: BTreeMap<String, usize>,
    pub isolated_counts: BTreeMap<String, usize>,
    pub per_owner: BTreeMap<String, usize>,
    pub isolated_total: usize,
    pub issues: Vec<String>,
    pub details: String,
}

#[derive(Clone)]
pub struct MigrationService {
    store: Arc<dyn DocumentStore>,
    blobs: BlobStore,
    batch_limit: usize,
}

impl MigrationService {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: BlobStore) -> Self {
        Self {
            store,
            blobs,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}
