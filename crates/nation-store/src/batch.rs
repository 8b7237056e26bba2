//! Staged writes
//!
//! Callers gather everything they need first (ledger calls, reads), stage the
//! resulting changes in a `WriteBatch`, then hand the batch to the store in a
//! single atomic commit. Nothing is mutated outside a commit.

use nation_core::{
    ContractId, LocalId, NationContent, NationError, NationRecord, NationResult, TransactionJob,
    TxJobStatus,
};

/// Field-level update of an existing record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub contract_id: Option<ContractId>,
    pub content: Option<NationContent>,
    pub joined: Option<bool>,
    pub citizens: Option<u64>,
    pub created: Option<bool>,
    /// `Some(None)` detaches the job
    pub tx: Option<Option<TransactionJob>>,
    pub job_status: Option<TxJobStatus>,
    /// Fail with `StateLocked` if the record has a pending job at commit time
    pub require_unlocked: bool,
}

impl RecordPatch {
    pub fn new() -> Self {
        RecordPatch::default()
    }

    pub fn contract_id(mut self, id: ContractId) -> Self {
        self.contract_id = Some(id);
        self
    }

    pub fn content(mut self, content: NationContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn joined(mut self, joined: bool) -> Self {
        self.joined = Some(joined);
        self
    }

    pub fn citizens(mut self, citizens: u64) -> Self {
        self.citizens = Some(citizens);
        self
    }

    pub fn created(mut self, created: bool) -> Self {
        self.created = Some(created);
        self
    }

    pub fn attach_job(mut self, job: TransactionJob) -> Self {
        self.tx = Some(Some(job));
        self
    }

    pub fn detach_job(mut self) -> Self {
        self.tx = Some(None);
        self
    }

    pub fn job_status(mut self, status: TxJobStatus) -> Self {
        self.job_status = Some(status);
        self
    }

    /// Re-check the mutation gate inside the commit
    pub fn require_unlocked(mut self) -> Self {
        self.require_unlocked = true;
        self
    }

    /// Apply to a record, enforcing the record invariants
    ///
    /// The ledger id may be assigned once; re-assigning the same value is a
    /// no-op so replays stay idempotent. Draft content is frozen once the
    /// record is submitted.
    pub fn apply(&self, record: &mut NationRecord) -> NationResult<()> {
        if self.require_unlocked {
            record.ensure_mutable()?;
        }

        if let Some(content) = &self.content {
            record.ensure_draft()?;
            record.content = content.clone();
        }

        if let Some(id) = self.contract_id {
            match record.id_in_smart_contract {
                Some(existing) if existing != id => {
                    return Err(NationError::WriteFailed(format!(
                        "nation {} already has ledger id {}, refusing {}",
                        record.local_id, existing, id
                    )));
                }
                _ => record.id_in_smart_contract = Some(id),
            }
        }

        if let Some(joined) = self.joined {
            record.joined = joined;
        }
        if let Some(citizens) = self.citizens {
            record.citizens = citizens;
        }
        if let Some(created) = self.created {
            record.created = created;
        }
        if let Some(tx) = &self.tx {
            record.tx = tx.clone();
        }

        if let Some(status) = self.job_status {
            match record.tx.as_mut() {
                Some(job) => job.status = status,
                None => {
                    return Err(NationError::WriteFailed(format!(
                        "nation {} has no transaction job",
                        record.local_id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// One staged operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert; fails if the local id is taken
    Create(NationRecord),
    /// Insert or replace by local id
    Upsert(NationRecord),
    Update { id: LocalId, patch: RecordPatch },
    Delete(LocalId),
}

impl WriteOp {
    pub fn target(&self) -> LocalId {
        match self {
            WriteOp::Create(record) | WriteOp::Upsert(record) => record.local_id,
            WriteOp::Update { id, .. } | WriteOp::Delete(id) => *id,
        }
    }
}

/// Ordered set of operations committed together
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch::default()
    }

    pub fn create(mut self, record: NationRecord) -> Self {
        self.ops.push(WriteOp::Create(record));
        self
    }

    pub fn upsert(mut self, record: NationRecord) -> Self {
        self.ops.push(WriteOp::Upsert(record));
        self
    }

    pub fn update(mut self, id: LocalId, patch: RecordPatch) -> Self {
        self.ops.push(WriteOp::Update { id, patch });
        self
    }

    pub fn delete(mut self, id: LocalId) -> Self {
        self.ops.push(WriteOp::Delete(id));
        self
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use nation_core::{AccountId, TxHash, TxJobType};

    fn draft() -> NationRecord {
        NationRecord::draft(LocalId::FIRST, AccountId::new("a"), NationContent::named("Test"))
    }

    #[test]
    fn test_contract_id_set_once() {
        let mut record = draft();
        RecordPatch::new().contract_id(ContractId::new(42)).apply(&mut record).unwrap();
        RecordPatch::new().contract_id(ContractId::new(42)).apply(&mut record).unwrap();

        let err = RecordPatch::new()
            .contract_id(ContractId::new(43))
            .apply(&mut record)
            .unwrap_err();
        assert!(matches!(err, NationError::WriteFailed(_)));
        assert_eq!(record.id_in_smart_contract, Some(ContractId::new(42)));
    }

    #[test]
    fn test_content_frozen_after_submission() {
        let mut record = draft();
        record.id_in_smart_contract = Some(ContractId::new(1));
        let err = RecordPatch::new()
            .content(NationContent::named("Other"))
            .apply(&mut record)
            .unwrap_err();
        assert_eq!(err, NationError::AlreadySubmitted(LocalId::FIRST));
    }

    #[test]
    fn test_job_status_needs_a_job() {
        let mut record = draft();
        assert!(RecordPatch::new().job_status(TxJobStatus::Confirmed).apply(&mut record).is_err());

        let job = TransactionJob::pending(TxHash::from("0x1"), TxJobType::Create, AccountId::new("a"));
        RecordPatch::new()
            .attach_job(job)
            .job_status(TxJobStatus::Confirmed)
            .apply(&mut record)
            .unwrap();
        assert!(record.can_mutate());
    }

    #[test]
    fn test_require_unlocked_rechecks_gate() {
        let mut record = draft();
        record.tx = Some(TransactionJob::pending(TxHash::from("0x1"), TxJobType::Create, AccountId::new("a")));
        let job = TransactionJob::pending(TxHash::from("0x2"), TxJobType::Create, AccountId::new("a"));
        let err = RecordPatch::new()
            .attach_job(job)
            .require_unlocked()
            .apply(&mut record)
            .unwrap_err();
        assert_eq!(err, NationError::StateLocked(LocalId::FIRST));
    }

    #[test]
    fn test_batch_targets() {
        let batch = WriteBatch::new()
            .create(draft())
            .update(LocalId::new(2), RecordPatch::new().joined(true))
            .delete(LocalId::new(3));
        let targets: Vec<_> = batch.ops().iter().map(WriteOp::target).collect();
        assert_eq!(targets, vec![LocalId::new(1), LocalId::new(2), LocalId::new(3)]);
    }
}
