//! Transaction job creation

use async_trait::async_trait;

use nation_core::{AccountId, NationResult, TransactionJob, TxHash, TxJobType};

/// Produces the job that tracks a submitted transaction
///
/// Jobs start PENDING. Whatever watches the ledger moves them on; the
/// lifecycle controller only attaches them.
#[async_trait]
pub trait TxJobFactory: Send + Sync {
    async fn create(
        &self,
        hash: TxHash,
        job_type: TxJobType,
        account: AccountId,
    ) -> NationResult<TransactionJob>;
}

/// Factory that builds plain pending jobs
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingJobFactory;

#[async_trait]
impl TxJobFactory for PendingJobFactory {
    async fn create(
        &self,
        hash: TxHash,
        job_type: TxJobType,
        account: AccountId,
    ) -> NationResult<TransactionJob> {
        Ok(TransactionJob::pending(hash, job_type, account))
    }
}
