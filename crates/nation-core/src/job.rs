//! Transaction jobs
//!
//! A job represents one outstanding ledger transaction against a record.
//! It is created as PENDING when the ledger call returns a hash; an external
//! watcher moves it to CONFIRMED or FAILED. The core only reads the status.

use serde::{Deserialize, Serialize};

use crate::{AccountId, TxHash};

/// Kind of ledger transaction a job tracks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxJobType {
    Create,
    Join,
    Leave,
}

impl TxJobType {
    pub fn name(self) -> &'static str {
        match self {
            TxJobType::Create => "NATION_CREATE",
            TxJobType::Join => "NATION_JOIN",
            TxJobType::Leave => "NATION_LEAVE",
        }
    }
}

/// Job status as observed from the watcher
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxJobStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxJobStatus {
    #[inline]
    pub fn is_pending(self) -> bool {
        self == TxJobStatus::Pending
    }
}

/// One outstanding ledger transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionJob {
    pub tx_hash: TxHash,
    pub job_type: TxJobType,
    pub status: TxJobStatus,
    pub account_id: AccountId,
}

impl TransactionJob {
    /// Create a freshly submitted job; status starts PENDING
    pub fn pending(tx_hash: TxHash, job_type: TxJobType, account_id: AccountId) -> Self {
        TransactionJob {
            tx_hash,
            job_type,
            status: TxJobStatus::Pending,
            account_id,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn with_status(mut self, status: TxJobStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_job() {
        let job = TransactionJob::pending(TxHash::from("0xabc"), TxJobType::Create, AccountId::new("a"));
        assert!(job.is_pending());
        assert!(!job.with_status(TxJobStatus::Confirmed).is_pending());
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&TxJobStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
        assert_eq!(TxJobType::Join.name(), "NATION_JOIN");
    }
}
