//! Nation lifecycle controller
//!
//! Drafts are created, edited and deleted locally until submitted. Submit,
//! join and leave each call the ledger, then attach a PENDING job to the
//! record; while that job is pending the record is locked against further
//! ledger-affecting operations. Confirmation is observed later, by
//! reconciliation or by whatever watches the job.
//!
//! Each operation gathers first (reads, ledger call) and then commits once.
//! No store lock is held across a ledger call.

use std::sync::Arc;

use nation_core::{
    AccountId, LocalId, NationContent, NationError, NationRecord, NationResult, TxHash, TxJobType,
};
use nation_ledger::LedgerGateway;
use nation_store::{Predicate, RecordPatch, RecordStore, SortField, WriteBatch};

use crate::{IdentifierAllocator, PendingJobFactory, TxJobFactory};

/// Draft CRUD and ledger transitions for one account
pub struct LifecycleController {
    account: AccountId,
    ledger: Arc<dyn LedgerGateway>,
    store: Arc<dyn RecordStore>,
    jobs: Arc<dyn TxJobFactory>,
    allocator: Arc<IdentifierAllocator>,
}

impl LifecycleController {
    pub fn new(account: AccountId, ledger: Arc<dyn LedgerGateway>, store: Arc<dyn RecordStore>) -> Self {
        LifecycleController {
            account,
            ledger,
            store,
            jobs: Arc::new(PendingJobFactory),
            allocator: Arc::new(IdentifierAllocator::new()),
        }
    }

    pub fn with_jobs(mut self, jobs: Arc<dyn TxJobFactory>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Share an allocator with the reconciliation engine
    pub fn with_allocator(mut self, allocator: Arc<IdentifierAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Mutation gate
    pub fn can_mutate(&self, record: &NationRecord) -> bool {
        record.can_mutate()
    }

    pub async fn nation_by_id(&self, id: LocalId) -> NationResult<NationRecord> {
        self.store.require(id).await
    }

    /// Every record of this account, by local id
    pub async fn nations(&self) -> NationResult<Vec<NationRecord>> {
        self.store
            .sorted_query(&Predicate::account(&self.account), SortField::LocalId, false)
            .await
    }

    // Drafts

    pub async fn create_draft(&self, content: NationContent) -> NationResult<NationRecord> {
        let mut ids = self.allocator.reserve(self.store.as_ref(), 1).await?;
        let id = ids
            .next()
            .ok_or_else(|| NationError::WriteFailed("reserved id block exhausted".into()))?;
        let draft = NationRecord::draft(id, self.account.clone(), content);
        // The id stays reserved until the draft is written
        let record = self.commit_one(WriteBatch::new().create(draft)).await?;
        drop(ids);
        tracing::info!(account = %self.account, local_id = %id, "draft saved");
        Ok(record)
    }

    pub async fn update_draft(&self, id: LocalId, content: NationContent) -> NationResult<NationRecord> {
        let existing = self.store.require(id).await?;
        existing.ensure_draft()?;

        let record = self
            .commit_one(WriteBatch::new().update(id, RecordPatch::new().content(content)))
            .await?;
        tracing::info!(account = %self.account, local_id = %id, "draft updated");
        Ok(record)
    }

    pub async fn delete_draft(&self, id: LocalId) -> NationResult<()> {
        let existing = self.store.require(id).await?;
        existing.ensure_draft()?;

        self.store.atomically(WriteBatch::new().delete(id)).await?;
        tracing::info!(account = %self.account, local_id = %id, "draft deleted");
        Ok(())
    }

    // Ledger transitions

    /// Send a draft to the ledger and attach the pending create job
    pub async fn submit(&self, id: LocalId) -> NationResult<NationRecord> {
        let draft = self.store.require(id).await?;
        draft.ensure_draft()?;
        self.gate(&draft)?;

        let payload = draft.content.to_ledger_json()?;
        let receipt = self.ledger.create_record(&payload).await?;
        let record = self.attach(id, receipt.hash.clone(), TxJobType::Create).await?;

        tracing::info!(
            account = %self.account,
            local_id = %id,
            tx_hash = %receipt.hash,
            "nation submitted"
        );
        Ok(record)
    }

    /// Save a new draft and submit it
    ///
    /// The two steps are observable separately: if the submit fails, the
    /// draft stays saved.
    pub async fn save_and_submit(&self, content: NationContent) -> NationResult<NationRecord> {
        let draft = self.create_draft(content).await?;
        self.submit(draft.local_id).await
    }

    pub async fn join(&self, id: LocalId) -> NationResult<NationRecord> {
        self.membership(id, TxJobType::Join).await
    }

    pub async fn leave(&self, id: LocalId) -> NationResult<NationRecord> {
        self.membership(id, TxJobType::Leave).await
    }

    async fn membership(&self, id: LocalId, job_type: TxJobType) -> NationResult<NationRecord> {
        let record = self.store.require(id).await?;
        self.gate(&record)?;
        let contract_id = record.id_in_smart_contract.ok_or(NationError::NotSubmitted(id))?;

        let receipt = match job_type {
            TxJobType::Join => self.ledger.join_record(contract_id).await?,
            _ => self.ledger.leave_record(contract_id).await?,
        };
        let record = self.attach(id, receipt.hash.clone(), job_type).await?;

        tracing::info!(
            account = %self.account,
            local_id = %id,
            %contract_id,
            tx_hash = %receipt.hash,
            job = job_type.name(),
            "membership change submitted"
        );
        Ok(record)
    }

    fn gate(&self, record: &NationRecord) -> NationResult<()> {
        record.ensure_mutable().map_err(|e| {
            tracing::warn!(account = %self.account, local_id = %record.local_id, "nation locked by pending transaction");
            e
        })
    }

    /// Create the job and attach it, re-checking the gate inside the commit
    async fn attach(
        &self,
        id: LocalId,
        hash: TxHash,
        job_type: TxJobType,
    ) -> NationResult<NationRecord> {
        let job = self.jobs.create(hash, job_type, self.account.clone()).await?;
        let patch = RecordPatch::new().attach_job(job).require_unlocked();
        self.commit_one(WriteBatch::new().update(id, patch)).await
    }

    async fn commit_one(&self, batch: WriteBatch) -> NationResult<NationRecord> {
        self.store
            .atomically(batch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NationError::WriteFailed("commit returned no record".into()))
    }
}
