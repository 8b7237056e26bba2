//! Store wrapper with injectable commit failures

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use nation_core::{NationError, NationRecord, NationResult};
use nation_store::{MemoryStore, Predicate, RecordStore, SortField, WriteBatch};

/// Delegates to a `MemoryStore`, failing the commits it is told to
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    commits: AtomicU64,
    failing_commits: Mutex<BTreeSet<u64>>,
    fail_reads: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        FaultyStore {
            inner,
            ..Default::default()
        }
    }

    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    /// Fail the `n`th commit from now (1 is the next one)
    pub fn fail_commit(&self, n: u64) {
        let target = self.commits.load(Ordering::SeqCst) + n;
        self.failing_commits.lock().insert(target);
    }

    pub fn fail_next_commit(&self) {
        self.fail_commit(1);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Commits attempted through this wrapper, failed ones included
    pub fn attempted_commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> NationResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NationError::WriteFailed("injected read failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn query(&self, predicate: &Predicate) -> NationResult<Vec<NationRecord>> {
        self.check_read()?;
        self.inner.query(predicate).await
    }

    async fn sorted_query(
        &self,
        predicate: &Predicate,
        field: SortField,
        descending: bool,
    ) -> NationResult<Vec<NationRecord>> {
        self.check_read()?;
        self.inner.sorted_query(predicate, field, descending).await
    }

    async fn atomically(&self, batch: WriteBatch) -> NationResult<Vec<NationRecord>> {
        let attempt = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_commits.lock().remove(&attempt) {
            tracing::debug!(attempt, ops = batch.len(), "injected commit failure");
            return Err(NationError::WriteFailed(format!("injected failure on commit {attempt}")));
        }
        self.inner.atomically(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nation_core::{AccountId, LocalId, NationContent};

    fn draft(id: u64) -> NationRecord {
        NationRecord::draft(LocalId::new(id), AccountId::new("a"), NationContent::named("n"))
    }

    #[tokio::test]
    async fn test_fails_only_the_chosen_commit() {
        let store = FaultyStore::new(Arc::new(MemoryStore::new()));
        store.fail_commit(2);

        store.create(draft(1), false).await.unwrap();
        assert!(matches!(store.create(draft(2), false).await, Err(NationError::WriteFailed(_))));
        store.create(draft(3), false).await.unwrap();

        assert_eq!(store.attempted_commits(), 3);
        assert_eq!(store.inner().len(), 2);
    }

    #[tokio::test]
    async fn test_read_failure() {
        let store = FaultyStore::new(Arc::new(MemoryStore::new()));
        store.set_fail_reads(true);
        assert!(store.get(LocalId::FIRST).await.is_err());
        store.set_fail_reads(false);
        assert_eq!(store.get(LocalId::FIRST).await.unwrap(), None);
    }
}
