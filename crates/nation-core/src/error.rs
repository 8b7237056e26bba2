//! Error types for nation lifecycle and reconciliation

use thiserror::Error;

use crate::{AccountId, ContractId, LocalId};

/// Nation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NationError {
    // Lifecycle errors
    #[error("Nation {0} was already submitted to the ledger")]
    AlreadySubmitted(LocalId),

    #[error("Nation {0} has a pending transaction")]
    StateLocked(LocalId),

    #[error("Nation {0} has not been submitted to the ledger")]
    NotSubmitted(LocalId),

    #[error("Nation {0} does not exist")]
    NotFound(LocalId),

    // Store errors
    #[error("Database write failed: {0}")]
    WriteFailed(String),

    // Ledger errors
    #[error("Ledger call failed: {0}")]
    LedgerCallFailed(String),

    #[error("Invalid metadata for contract nation {contract_id}: {reason}")]
    InvalidMetadata {
        contract_id: ContractId,
        reason: String,
    },

    // Reconciliation errors
    #[error("Reconciliation already running for account {0}")]
    ReconcileInProgress(AccountId),

    #[error("Collected {observed} of {expected} creation events before the deadline")]
    CollectTimeout { expected: u64, observed: u64 },

    #[error("Event collection cancelled")]
    Cancelled,

    #[error("Engine disposed")]
    Disposed,

    // Config errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for nation operations
pub type NationResult<T> = Result<T, NationError>;
