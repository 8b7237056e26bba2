//! Typed query predicates
//!
//! Predicates are values, not strings: an account id or hash can never be
//! mis-escaped into a different filter.

use std::cmp::Ordering;

use nation_core::{AccountId, ContractId, LocalId, NationRecord, TxHash, TxJobStatus, TxJobType};

/// Filter over nation records
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every record
    All,
    LocalId(LocalId),
    AccountId(AccountId),
    ContractId(ContractId),
    /// Whether `idInSmartContract` is set
    Submitted(bool),
    Joined(bool),
    /// Attached job has this hash
    TxHash(TxHash),
    /// Attached job has this type
    TxType(TxJobType),
    /// Attached job has this status
    TxStatus(TxJobStatus),
    /// Conjunction; empty matches everything
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn local_id(id: LocalId) -> Self {
        Predicate::LocalId(id)
    }

    pub fn account(account: &AccountId) -> Self {
        Predicate::AccountId(account.clone())
    }

    pub fn contract(id: ContractId) -> Self {
        Predicate::ContractId(id)
    }

    pub fn tx_hash(hash: &TxHash) -> Self {
        Predicate::TxHash(hash.clone())
    }

    pub fn tx_type(job_type: TxJobType) -> Self {
        Predicate::TxType(job_type)
    }

    pub fn tx_status(status: TxJobStatus) -> Self {
        Predicate::TxStatus(status)
    }

    /// Conjoin with another predicate, flattening nested conjunctions
    pub fn and(self, other: Predicate) -> Self {
        let mut terms = match self {
            Predicate::And(terms) => terms,
            Predicate::All => Vec::new(),
            single => vec![single],
        };
        match other {
            Predicate::And(more) => terms.extend(more),
            Predicate::All => {}
            single => terms.push(single),
        }
        Predicate::And(terms)
    }

    /// Evaluate against a record
    pub fn matches(&self, record: &NationRecord) -> bool {
        match self {
            Predicate::All => true,
            Predicate::LocalId(id) => record.local_id == *id,
            Predicate::AccountId(account) => record.account_id == *account,
            Predicate::ContractId(id) => record.id_in_smart_contract == Some(*id),
            Predicate::Submitted(submitted) => record.is_submitted() == *submitted,
            Predicate::Joined(joined) => record.joined == *joined,
            Predicate::TxHash(hash) => record.tx.as_ref().is_some_and(|tx| tx.tx_hash == *hash),
            Predicate::TxType(job_type) => {
                record.tx.as_ref().is_some_and(|tx| tx.job_type == *job_type)
            }
            Predicate::TxStatus(status) => record.tx.as_ref().is_some_and(|tx| tx.status == *status),
            Predicate::And(terms) => terms.iter().all(|p| p.matches(record)),
        }
    }
}

/// Field a sorted query orders by
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    LocalId,
    /// Unsubmitted records sort before all submitted ones
    ContractId,
    Citizens,
}

impl SortField {
    pub fn compare(self, a: &NationRecord, b: &NationRecord) -> Ordering {
        match self {
            SortField::LocalId => a.local_id.cmp(&b.local_id),
            SortField::ContractId => a.id_in_smart_contract.cmp(&b.id_in_smart_contract),
            SortField::Citizens => a.citizens.cmp(&b.citizens),
        }
    }
}
