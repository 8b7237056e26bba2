//! Ledger creation events
//!
//! Delivery is at-least-once: the same contract id may be emitted any number
//! of times. Consumers key on `contract_id`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ContractId, TxHash};

/// One ledger-emitted creation fact
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerCreationEvent {
    pub contract_id: ContractId,
    /// Hash of the creating transaction, when the ledger reports one
    pub tx_hash: Option<TxHash>,
}

impl LedgerCreationEvent {
    pub fn new(contract_id: ContractId, tx_hash: Option<TxHash>) -> Self {
        LedgerCreationEvent {
            contract_id,
            tx_hash,
        }
    }
}

/// Distinct creation events keyed by contract id
///
/// A re-emission of a known id keeps the first hash seen unless that one was
/// missing, in which case the later one fills it in.
#[derive(Clone, Debug, Default)]
pub struct CreationEventSet {
    events: BTreeMap<ContractId, Option<TxHash>>,
    emissions: u64,
}

impl CreationEventSet {
    pub fn new() -> Self {
        CreationEventSet::default()
    }

    /// Record an emission; returns true if the contract id was new
    pub fn insert(&mut self, event: LedgerCreationEvent) -> bool {
        self.emissions += 1;
        match self.events.get_mut(&event.contract_id) {
            Some(existing) => {
                if existing.is_none() {
                    *existing = event.tx_hash;
                }
                false
            }
            None => {
                self.events.insert(event.contract_id, event.tx_hash);
                true
            }
        }
    }

    /// Number of distinct contract ids
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Raw emissions observed, duplicates included
    pub fn emissions(&self) -> u64 {
        self.emissions
    }

    /// Distinct events in contract id order
    pub fn into_events(self) -> Vec<LedgerCreationEvent> {
        self.events
            .into_iter()
            .map(|(contract_id, tx_hash)| LedgerCreationEvent::new(contract_id, tx_hash))
            .collect()
    }
}
