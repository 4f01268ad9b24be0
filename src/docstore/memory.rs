use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::{Mutex, RwLock};

use super::{CollectionPath, Document, DocumentStore, StoreError, WriteBatch, WriteOp};

/// In-process store backing the demo mode and the test suite.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<BTreeMap<CollectionPath, Vec<Document>>>,
    commit_budget: Mutex<Option<usize>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `n` more commits succeed, then fail every commit after that.
    /// Simulates a backend going away halfway through a long run.
    pub async fn fail_commits_after(&self, n: usize) {
        *self.commit_budget.lock().await = Some(n);
    }

    pub async fn clear_failures(&self) {
        *self.commit_budget.lock().await = None;
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(path).cloned().unwrap_or_default())
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(path)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .cloned())
    }

    async fn count(&self, path: &CollectionPath) -> Result<usize, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(path).map(Vec::len).unwrap_or(0))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        batch.check_size()?;

        {
            let mut budget = self.commit_budget.lock().await;
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(StoreError::Unavailable(
                        "memory store is refusing commits".into(),
                    ));
                }
                *remaining -= 1;
            }
        }

        let mut collections = self.collections.write().await;
        for op in batch.into_ops() {
            match op {
                WriteOp::Set { path, id, data } => {
                    let docs = collections.entry(path).or_default();
                    match docs.iter_mut().find(|doc| doc.id == id) {
                        Some(existing) => existing.data = data,
                        None => docs.push(Document::new(id, data)),
                    }
                }
                WriteOp::Delete { path, id } => {
                    if let Some(docs) = collections.get_mut(&path) {
                        docs.retain(|doc| doc.id != id);
                        if docs.is_empty() {
                            collections.remove(&path);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn list_owners(&self) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        let owners: BTreeSet<String> = collections
            .keys()
            .filter_map(|path| path.owner().map(str::to_string))
            .collect();
        Ok(owners.into_iter().collect())
    }
}
