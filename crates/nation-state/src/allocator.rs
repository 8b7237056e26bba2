//! Local id allocation
//!
//! The next id is `max(existing) + 1`. Ids handed out but not yet written
//! are held by an [`IdBlock`]; while a block is alive no other reservation
//! overlaps it. Dropping the block gives the range back, so once its
//! records are committed (or the write failed) allocation falls back to
//! the store maximum. A reservation that raced with a release re-reads
//! that maximum.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use nation_core::{LocalId, NationResult};
use nation_store::{Predicate, RecordStore, SortField};

#[derive(Debug, Default)]
struct Reservations {
    /// Outstanding blocks, `start -> end` (exclusive)
    blocks: BTreeMap<u64, u64>,
    /// Bumped on every release
    releases: u64,
}

type Reserved = Arc<Mutex<Reservations>>;

/// Allocates locally-unique record ids
#[derive(Debug, Default)]
pub struct IdentifierAllocator {
    reserved: Reserved,
}

impl IdentifierAllocator {
    pub fn new() -> Self {
        IdentifierAllocator::default()
    }

    /// `max(existing) + 1`, or 1 on an empty store
    pub async fn next_id(&self, store: &dyn RecordStore) -> NationResult<LocalId> {
        let top = store
            .sorted_query(&Predicate::All, SortField::LocalId, true)
            .await?
            .first()
            .map_or(0, |r| r.local_id.get());
        Ok(LocalId::new(top + 1))
    }

    /// Reserve `count` contiguous ids until the returned block is dropped
    pub async fn reserve(&self, store: &dyn RecordStore, count: u64) -> NationResult<IdBlock> {
        let (mut reserved, next) = loop {
            let seen = self.reserved.lock().releases;
            let next = self.next_id(store).await?.get();
            let reserved = self.reserved.lock();
            if reserved.releases == seen {
                break (reserved, next);
            }
        };
        let start = reserved.blocks.values().copied().max().map_or(next, |end| next.max(end));
        if count > 0 {
            reserved.blocks.insert(start, start + count);
        }
        drop(reserved);
        tracing::trace!(start, count, "local ids reserved");
        Ok(IdBlock {
            start,
            next: start,
            end: start + count,
            reserved: Arc::clone(&self.reserved),
        })
    }

    /// Ids currently held by live blocks
    pub fn outstanding(&self) -> u64 {
        self.reserved.lock().blocks.iter().map(|(start, end)| end - start).sum()
    }
}

/// Contiguous range of reserved ids, released on drop
#[derive(Debug)]
pub struct IdBlock {
    start: u64,
    next: u64,
    end: u64,
    reserved: Reserved,
}

impl IdBlock {
    pub fn remaining(&self) -> u64 {
        self.end - self.next
    }
}

impl Iterator for IdBlock {
    type Item = LocalId;

    fn next(&mut self) -> Option<LocalId> {
        if self.next >= self.end {
            return None;
        }
        let id = LocalId::new(self.next);
        self.next += 1;
        Some(id)
    }
}

impl Drop for IdBlock {
    fn drop(&mut self) {
        if self.end > self.start {
            let mut reserved = self.reserved.lock();
            reserved.blocks.remove(&self.start);
            reserved.releases += 1;
            tracing::trace!(start = self.start, unused = self.end - self.next, "local ids released");
        }
    }
}
