//! Shared ledger and store with one runtime per account

use std::collections::HashMap;
use std::sync::Arc;

use nation_core::{AccountId, ContractId, NationContent, NationRecord};
use nation_ledger::{LedgerGateway, MemoryLedger};
use nation_runtime::{AccountRuntime, RuntimeConfig, RuntimeShared};
use nation_store::MemoryStore;

use crate::{ChaosConfig, ChaosLedger, FaultyStore};

/// Account that signs `publish` calls
pub const OUTSIDER: &str = "0xoutsider";

/// Test world
///
/// Every runtime created from the world talks to the same ledger and the
/// same store, and shares the id allocator and flight locks.
pub struct TestWorld {
    ledger: MemoryLedger,
    store: Arc<FaultyStore>,
    shared: RuntimeShared,
    config: RuntimeConfig,
    chaos: Option<ChaosConfig>,
}

impl Default for TestWorld {
    fn default() -> Self {
        TestWorld::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        TestWorld {
            ledger: MemoryLedger::new(AccountId::new(OUTSIDER)),
            store: Arc::new(FaultyStore::new(Arc::new(MemoryStore::new()))),
            shared: RuntimeShared::default(),
            config: RuntimeConfig {
                collect_timeout_ms: 5_000,
                ..Default::default()
            },
            chaos: None,
        }
    }

    /// Deliver creation events through a `ChaosLedger`
    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.chaos = Some(chaos);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<FaultyStore> {
        &self.store
    }

    /// Gateway signing as `account`
    pub fn gateway(&self, account: &AccountId) -> Arc<dyn LedgerGateway> {
        let signer = self.ledger.signer(account.clone());
        match &self.chaos {
            Some(chaos) => {
                // Distinct but reproducible stream per account
                let mut chaos = chaos.clone();
                chaos.seed ^= account.as_str().bytes().fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
                Arc::new(ChaosLedger::new(signer, chaos)) as Arc<dyn LedgerGateway>
            }
            None => Arc::new(signer),
        }
    }

    pub fn runtime(&self, account: &str) -> AccountRuntime {
        self.runtime_with(account, self.config.clone())
    }

    pub fn runtime_with(&self, account: &str, config: RuntimeConfig) -> AccountRuntime {
        let account = AccountId::new(account);
        AccountRuntime::with_shared(
            account.clone(),
            self.gateway(&account),
            self.store.clone(),
            config,
            &self.shared,
        )
    }

    /// Create a nation on the ledger from outside any runtime
    pub fn publish(&self, name: &str) -> ContractId {
        let metadata = NationContent::named(name)
            .to_ledger_json()
            .unwrap_or_else(|_| "{}".to_string());
        self.ledger.publish(metadata)
    }

    pub fn publish_many(&self, count: usize) -> Vec<ContractId> {
        (0..count).map(|i| self.publish(&format!("nation-{i}"))).collect()
    }

    pub fn mine(&self) -> usize {
        self.ledger.mine()
    }

    /// Every stored record, in local id order
    pub fn records(&self) -> Vec<NationRecord> {
        self.store.inner().snapshot()
    }

    pub fn records_of(&self, account: &str) -> Vec<NationRecord> {
        let account = AccountId::new(account);
        self.records().into_iter().filter(|r| r.account_id == account).collect()
    }

    /// Ledger ids that more than one of `account`'s records claims
    pub fn duplicate_contract_ids(&self, account: &str) -> Vec<ContractId> {
        let mut seen: HashMap<ContractId, usize> = HashMap::new();
        for id in self.records_of(account).iter().filter_map(|r| r.id_in_smart_contract) {
            *seen.entry(id).or_default() += 1;
        }
        let mut duplicates: Vec<_> = seen.into_iter().filter(|(_, n)| *n > 1).map(|(id, _)| id).collect();
        duplicates.sort();
        duplicates
    }
}
