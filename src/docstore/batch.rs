use super::{DocumentStore, StoreError, WriteBatch, WriteOp, MAX_BATCH_WRITES};

/// Default commit size, kept below [`MAX_BATCH_WRITES`] for headroom.
pub const DEFAULT_BATCH_LIMIT: usize = 450;

/// Accumulates write groups and commits them in batches of at most `limit`
/// operations. A group is never split across two commits.
///
/// Nothing is committed implicitly on drop: whatever is still pending when the
/// writer goes away is discarded.
pub struct BatchWriter<'a> {
    store: &'a dyn DocumentStore,
    limit: usize,
    pending: WriteBatch,
    pending_groups: usize,
    committed_groups: usize,
    commits: usize,
    largest_batch: usize,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn DocumentStore, limit: usize) -> Self {
        Self {
            store,
            limit: limit.clamp(1, MAX_BATCH_WRITES),
            pending: WriteBatch::new(),
            pending_groups: 0,
            committed_groups: 0,
            commits: 0,
            largest_batch: 0,
        }
    }

    pub async fn stage(&mut self, group: Vec<WriteOp>) -> Result<(), StoreError> {
        if group.is_empty() {
            return Ok(());
        }
        if group.len() > self.limit {
            return Err(StoreError::BatchTooLarge {
                size: group.len(),
                limit: self.limit,
            });
        }
        if self.pending.len() + group.len() > self.limit {
            self.flush().await?;
        }
        for op in group {
            self.pending.push(op);
        }
        self.pending_groups += 1;
        Ok(())
    }

    /// Commit whatever is pending. Returns the number of groups committed.
    /// On failure the pending batch is dropped unapplied.
    pub async fn flush(&mut self) -> Result<usize, StoreError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::take(&mut self.pending);
        let groups = std::mem::take(&mut self.pending_groups);
        let size = batch.len();

        self.store.commit(batch).await?;

        self.commits += 1;
        self.committed_groups += groups;
        self.largest_batch = self.largest_batch.max(size);
        tracing::debug!(
            "Committed batch #{} ({} writes, {} groups)",
            self.commits,
            size,
            groups
        );
        Ok(groups)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn committed_groups(&self) -> usize {
        self.committed_groups
    }

    pub fn largest_batch(&self) -> usize {
        self.largest_batch
    }
}
