//! Document store port.
//!
//! Collections are addressed Firestore-style: global collections are a bare
//! name (`media`), per-user collections live under `users/{owner}/{name}`.
//! Adapters implement [`DocumentStore`]; the rest of the crate only ever sees
//! `Arc<dyn DocumentStore>`.

mod batch;
mod memory;
mod sqlite;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub use self::batch::{BatchWriter, DEFAULT_BATCH_LIMIT};
pub use self::memory::MemoryDocumentStore;
pub use self::sqlite::SqliteDocumentStore;

/// Hard ceiling on operations in one atomic commit.
pub const MAX_BATCH_WRITES: usize = 500;

const USERS_ROOT: &str = "users";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Batch of {size} writes exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Document body must be a JSON object")]
    NotAnObject,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn global(name: &str) -> Self {
        Self(name.to_string())
    }

    /// `users/{owner}/{name}`. Fails when `owner` is not a usable path segment.
    pub fn user(owner: &str, name: &str) -> Result<Self, StoreError> {
        validate_segment(owner)?;
        Ok(Self(format!("{}/{}/{}", USERS_ROOT, owner, name)))
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments: Vec<&str> = raw.split('/').collect();
        match segments.as_slice() {
            [name] if !name.is_empty() => Ok(Self::global(name)),
            [root, owner, name] if *root == USERS_ROOT && !name.is_empty() => {
                Self::user(owner, name)
            }
            _ => Err(StoreError::InvalidPath(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner segment for per-user paths, `None` for global collections.
    pub fn owner(&self) -> Option<&str> {
        let mut parts = self.0.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(USERS_ROOT), Some(owner), Some(_)) => Some(owner),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn is_global(&self) -> bool {
        self.owner().is_none()
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejects ids that would escape their segment, in a collection path or on disk.
pub fn validate_segment(segment: &str) -> Result<(), StoreError> {
    if segment.trim().is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(StoreError::InvalidPath(format!(
            "invalid path segment {:?}",
            segment
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Decode into a model; the document id is injected as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut object = self.data.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(object))
    }
}

/// Encode a model as document fields. The `id` key is dropped; it lives in the
/// document address, not its body.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(mut object) => {
            object.remove("id");
            Ok(object)
        }
        _ => Err(StoreError::NotAnObject),
    }
}

pub fn new_document_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set {
        path: CollectionPath,
        id: String,
        data: Map<String, Value>,
    },
    Delete {
        path: CollectionPath,
        id: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: CollectionPath, id: impl Into<String>, data: Map<String, Value>) {
        self.ops.push(WriteOp::Set {
            path,
            id: id.into(),
            data,
        });
    }

    pub fn delete(&mut self, path: CollectionPath, id: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            path,
            id: id.into(),
        });
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub(crate) fn check_size(&self) -> Result<(), StoreError> {
        if self.ops.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge {
                size: self.ops.len(),
                limit: MAX_BATCH_WRITES,
            });
        }
        Ok(())
    }
}

/// Persistence port shared by the gallery, auth and migration layers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents of a collection in first-insertion order.
    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError>;

    async fn count(&self, path: &CollectionPath) -> Result<usize, StoreError>;

    /// Apply every op or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Distinct owners with at least one document under `users/{owner}/...`.
    async fn list_owners(&self) -> Result<Vec<String>, StoreError>;

    /// Insert under a fresh id and return the stored document.
    async fn insert(
        &self,
        path: &CollectionPath,
        data: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let id = new_document_id();
        self.set(path, &id, data.clone()).await?;
        Ok(Document::new(id, data))
    }

    async fn set(
        &self,
        path: &CollectionPath,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.set(path.clone(), id, data);
        self.commit(batch).await
    }

    /// Returns whether the document existed.
    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<bool, StoreError> {
        if self.get(path, id).await?.is_none() {
            return Ok(false);
        }
        let mut batch = WriteBatch::new();
        batch.delete(path.clone(), id);
        self.commit(batch).await?;
        Ok(true)
    }

    /// Linear scan for documents whose string field equals `value`.
    async fn find_where(
        &self,
        path: &CollectionPath,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .list(path)
            .await?
            .into_iter()
            .filter(|doc| doc.str_field(field) == Some(value))
            .collect())
    }
}
