//! Record store abstraction
//!
//! Every read may suspend. Every write goes through `atomically`, which
//! commits a whole batch or nothing. Implementations must never hold a lock
//! across an `.await` of the caller's.

use async_trait::async_trait;

use nation_core::{LocalId, NationError, NationRecord, NationResult};

use crate::{Predicate, SortField, WriteBatch};

/// Transactional store of nation records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records matching a predicate, in local id order
    async fn query(&self, predicate: &Predicate) -> NationResult<Vec<NationRecord>>;

    /// Records matching a predicate, ordered by `field`
    async fn sorted_query(
        &self,
        predicate: &Predicate,
        field: SortField,
        descending: bool,
    ) -> NationResult<Vec<NationRecord>>;

    /// Commit a batch all-or-nothing
    ///
    /// Returns the resulting record for every create, upsert and update in
    /// batch order. On error no operation of the batch is visible.
    async fn atomically(&self, batch: WriteBatch) -> NationResult<Vec<NationRecord>>;

    /// Lookup by local id
    async fn get(&self, id: LocalId) -> NationResult<Option<NationRecord>> {
        Ok(self.query(&Predicate::local_id(id)).await?.into_iter().next())
    }

    /// Lookup by local id, failing with `NotFound`
    async fn require(&self, id: LocalId) -> NationResult<NationRecord> {
        self.get(id).await?.ok_or(NationError::NotFound(id))
    }

    /// Create (or with `upsert`, replace) one record in its own commit
    async fn create(&self, record: NationRecord, upsert: bool) -> NationResult<NationRecord> {
        let batch = if upsert {
            WriteBatch::new().upsert(record)
        } else {
            WriteBatch::new().create(record)
        };
        first_written(self.atomically(batch).await?)
    }

    /// Delete one record in its own commit
    async fn delete(&self, id: LocalId) -> NationResult<()> {
        self.atomically(WriteBatch::new().delete(id)).await?;
        Ok(())
    }
}

fn first_written(records: Vec<NationRecord>) -> NationResult<NationRecord> {
    records
        .into_iter()
        .next()
        .ok_or_else(|| NationError::WriteFailed("store returned no record".into()))
}
