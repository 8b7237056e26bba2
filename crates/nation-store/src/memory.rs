//! In-memory record store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use nation_core::{LocalId, NationError, NationRecord, NationResult};

use crate::{Predicate, RecordStore, SortField, WriteBatch, WriteOp};

/// Record store backed by an ordered map
///
/// A commit applies the batch to a copy of the map and swaps it in only if
/// every operation succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<LocalId, NationRecord>>,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Seed a store with existing records
    pub fn with_records(records: impl IntoIterator<Item = NationRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.local_id, r)).collect();
        MemoryStore {
            records: RwLock::new(map),
            commits: AtomicU64::new(0),
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Successful commits so far
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Copy of every record, in local id order
    pub fn snapshot(&self) -> Vec<NationRecord> {
        self.records.read().values().cloned().collect()
    }

    fn apply_op(
        working: &mut BTreeMap<LocalId, NationRecord>,
        op: WriteOp,
    ) -> NationResult<Option<NationRecord>> {
        match op {
            WriteOp::Create(record) => {
                if working.contains_key(&record.local_id) {
                    return Err(NationError::WriteFailed(format!(
                        "nation {} already exists",
                        record.local_id
                    )));
                }
                working.insert(record.local_id, record.clone());
                Ok(Some(record))
            }
            WriteOp::Upsert(record) => {
                // A ledger id is set once and never cleared or replaced
                if let Some(old) = working.get(&record.local_id).and_then(|r| r.id_in_smart_contract) {
                    if record.id_in_smart_contract != Some(old) {
                        return Err(NationError::WriteFailed(format!(
                            "nation {} already has ledger id {}",
                            record.local_id, old
                        )));
                    }
                }
                working.insert(record.local_id, record.clone());
                Ok(Some(record))
            }
            WriteOp::Update { id, patch } => {
                let record = working.get_mut(&id).ok_or(NationError::NotFound(id))?;
                patch.apply(record)?;
                Ok(Some(record.clone()))
            }
            WriteOp::Delete(id) => {
                working.remove(&id).ok_or(NationError::NotFound(id))?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query(&self, predicate: &Predicate) -> NationResult<Vec<NationRecord>> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|r| predicate.matches(r))
            .cloned()
            .collect())
    }

    async fn sorted_query(
        &self,
        predicate: &Predicate,
        field: SortField,
        descending: bool,
    ) -> NationResult<Vec<NationRecord>> {
        let mut matched = self.query(predicate).await?;
        matched.sort_by(|a, b| {
            let ord = field.compare(a, b);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(matched)
    }

    async fn atomically(&self, batch: WriteBatch) -> NationResult<Vec<NationRecord>> {
        let op_count = batch.len();
        let mut records = self.records.write();
        let mut working = records.clone();
        let mut written = Vec::with_capacity(op_count);

        for op in batch.into_ops() {
            let target = op.target();
            match Self::apply_op(&mut working, op) {
                Ok(Some(record)) => written.push(record),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(local_id = %target, error = %e, "write batch rejected");
                    return Err(e);
                }
            }
        }

        *records = working;
        self.commits.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(ops = op_count, "write batch committed");
        Ok(written)
    }
}
