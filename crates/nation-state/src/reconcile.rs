//! Ledger reconciliation
//!
//! One pass converges the local store with the ledger for a single account:
//!
//! 1. Ask the ledger how many records exist (`N`); stop if there are none.
//! 2. Subscribe, rewind the event cursor, and collect `N` distinct creation
//!    events. Duplicate emissions are absorbed by the collector.
//! 3. Reserve `N` local ids up front, released again once the pass ends.
//! 4. Fetch joined ids and citizen counts concurrently.
//! 5. Resolve every event: a pending submission of this account with the
//!    same hash, else a confirmed local record with the same ledger id, else
//!    an unknown record whose metadata is fetched and staged as a new record.
//! 6. Commit everything in one atomic batch.
//!
//! Passes for the same account are serialized through [`AccountLocks`].
//! Any failure fails the whole pass before anything is written.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use parking_lot::Mutex;
use serde::Serialize;

use nation_core::{
    AccountId, ContractId, CreationEventSet, LedgerCreationEvent, NationContent, NationError,
    NationRecord, NationResult, Network, TxJobType,
};
use nation_ledger::{coerce_joined_ids, CancelHandle, EventCollector, LedgerGateway};
use nation_store::{Predicate, RecordPatch, RecordStore, WriteBatch};

use crate::{AccountLocks, IdBlock, IdentifierAllocator, ReentryPolicy};

/// Default bound on event collection
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reconciliation settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Block the event cursor is rewound to
    pub start_block: u64,
    /// How long to wait for `N` distinct creation events
    pub collect_timeout: Duration,
    /// Behaviour of a re-entrant `reconcile()`
    pub reentry: ReentryPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig::for_network(Network::default())
    }
}

impl ReconcileConfig {
    /// Settings for a deployed contract
    pub fn for_network(network: Network) -> Self {
        ReconcileConfig {
            start_block: network.contract_creation_block(),
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            reentry: ReentryPolicy::Queue,
        }
    }

    pub fn with_start_block(mut self, block: u64) -> Self {
        self.start_block = block;
        self
    }

    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    pub fn with_reentry(mut self, reentry: ReentryPolicy) -> Self {
        self.reentry = reentry;
        self
    }
}

/// Outcome of one pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records the ledger reported
    pub expected: u64,
    /// Raw creation emissions received, duplicates included
    pub emissions: u64,
    /// Pending local submissions that got their ledger id
    pub confirmed_drafts: u64,
    /// Known records whose membership was refreshed
    pub refreshed: u64,
    /// Records created locally from ledger metadata
    pub discovered: u64,
}

impl ReconcileReport {
    /// Records touched by the commit
    pub fn written(&self) -> u64 {
        self.confirmed_drafts + self.refreshed + self.discovered
    }
}

/// An event whose local counterpart does not exist yet
struct Unknown {
    contract_id: ContractId,
    joined: bool,
    citizens: u64,
}

/// Converges the local store with the ledger for one account
pub struct ReconciliationEngine {
    account: AccountId,
    ledger: Arc<dyn LedgerGateway>,
    store: Arc<dyn RecordStore>,
    allocator: Arc<IdentifierAllocator>,
    locks: Arc<AccountLocks>,
    config: ReconcileConfig,
    active: Mutex<Option<CancelHandle>>,
    disposed: AtomicBool,
}

impl ReconciliationEngine {
    pub fn new(
        account: AccountId,
        ledger: Arc<dyn LedgerGateway>,
        store: Arc<dyn RecordStore>,
        config: ReconcileConfig,
    ) -> Self {
        ReconciliationEngine {
            account,
            ledger,
            store,
            allocator: Arc::new(IdentifierAllocator::new()),
            locks: Arc::new(AccountLocks::new()),
            config,
            active: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Share an allocator with the lifecycle controller
    pub fn with_allocator(mut self, allocator: Arc<IdentifierAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Share the single-flight registry between engines
    pub fn with_locks(mut self, locks: Arc<AccountLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Whether a pass for this account is in flight
    pub fn is_running(&self) -> bool {
        self.locks.is_busy(&self.account)
    }

    /// Run one reconciliation pass
    pub async fn reconcile(&self) -> NationResult<ReconcileReport> {
        self.ensure_live()?;
        let _flight = self.locks.acquire(&self.account, self.config.reentry).await?;
        self.ensure_live()?;

        let expected = self.ledger.count_records().await?;
        if expected == 0 {
            tracing::debug!(account = %self.account, "ledger holds no nations");
            return Ok(ReconcileReport::default());
        }

        let collected = self.collect(expected).await?;
        let emissions = collected.emissions();
        let events = collected.into_events();

        // Held until after the commit; unused ids go back on drop
        let mut ids = self.allocator.reserve(self.store.as_ref(), events.len() as u64).await?;
        let (joined, citizens) = self.fetch_membership(&events).await?;
        let (batch, mut report) = self.resolve(events, &joined, citizens, &mut ids).await?;
        report.expected = expected;
        report.emissions = emissions;

        // A disposed engine must not write late results
        self.ensure_live()?;
        if !batch.is_empty() {
            self.store.atomically(batch).await?;
        }

        tracing::info!(
            account = %self.account,
            expected,
            emissions,
            confirmed_drafts = report.confirmed_drafts,
            refreshed = report.refreshed,
            discovered = report.discovered,
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Tear down: cancel any in-flight collection and refuse further passes
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(cancel) = self.active.lock().take() {
            cancel.cancel();
        }
        tracing::debug!(account = %self.account, "reconciliation engine disposed");
    }

    fn ensure_live(&self) -> NationResult<()> {
        if self.is_disposed() {
            return Err(NationError::Disposed);
        }
        Ok(())
    }

    /// Subscribe, rewind, and wait for `expected` distinct events
    ///
    /// The listener is removed before returning, on every path.
    async fn collect(&self, expected: u64) -> NationResult<CreationEventSet> {
        let mut subscription = self.ledger.subscribe_created()?;
        let (collector, cancel) = EventCollector::new(expected, self.config.collect_timeout);
        *self.active.lock() = Some(cancel);

        let result = if self.is_disposed() {
            Err(NationError::Disposed)
        } else {
            match self.ledger.reset_event_cursor(self.config.start_block).await {
                Ok(()) => collector.collect(&mut subscription).await,
                Err(e) => Err(e),
            }
        };

        self.active.lock().take();
        subscription.unsubscribe();

        if let Err(e) = &result {
            tracing::warn!(account = %self.account, expected, error = %e, "event collection failed");
        }
        result
    }

    async fn fetch_membership(
        &self,
        events: &[LedgerCreationEvent],
    ) -> NationResult<(HashSet<ContractId>, Vec<u64>)> {
        let joined = async {
            let raw = self.ledger.joined_record_ids(&self.account).await?;
            Ok::<_, NationError>(coerce_joined_ids(&raw).into_iter().collect::<HashSet<_>>())
        };
        let citizens = future::try_join_all(
            events.iter().map(|event| self.ledger.member_count(event.contract_id)),
        );
        futures::try_join!(joined, citizens)
    }

    /// Three-way merge of events against the store
    async fn resolve(
        &self,
        events: Vec<LedgerCreationEvent>,
        joined: &HashSet<ContractId>,
        citizens: Vec<u64>,
        ids: &mut IdBlock,
    ) -> NationResult<(WriteBatch, ReconcileReport)> {
        let mut batch = WriteBatch::new();
        let mut report = ReconcileReport::default();
        let mut unknown = Vec::new();

        for (event, citizens) in events.into_iter().zip(citizens) {
            let contract_id = event.contract_id;
            let is_joined = joined.contains(&contract_id);

            if let Some(draft) = self.pending_submission(&event).await? {
                tracing::debug!(
                    account = %self.account,
                    local_id = %draft.local_id,
                    %contract_id,
                    "submission confirmed"
                );
                let patch = RecordPatch::new()
                    .contract_id(contract_id)
                    .joined(is_joined)
                    .citizens(citizens)
                    .created(true);
                batch = batch.update(draft.local_id, patch);
                report.confirmed_drafts += 1;
                continue;
            }

            if let Some(known) = self.confirmed_record(contract_id).await? {
                tracing::trace!(local_id = %known.local_id, %contract_id, "nation refreshed");
                batch = batch.update(known.local_id, RecordPatch::new().joined(is_joined).citizens(citizens));
                report.refreshed += 1;
                continue;
            }

            unknown.push(Unknown {
                contract_id,
                joined: is_joined,
                citizens,
            });
        }

        let metadata = future::try_join_all(
            unknown.iter().map(|u| self.ledger.metadata(u.contract_id)),
        )
        .await?;

        for (record, metadata) in unknown.into_iter().zip(metadata) {
            let content = NationContent::from_ledger_json(record.contract_id, &metadata)?;
            let local_id = ids.next().ok_or_else(|| {
                NationError::WriteFailed("reserved id block exhausted".into())
            })?;
            tracing::debug!(
                account = %self.account,
                %local_id,
                contract_id = %record.contract_id,
                "nation discovered on ledger"
            );
            batch = batch.create(NationRecord::confirmed(
                local_id,
                self.account.clone(),
                record.contract_id,
                content,
                record.joined,
                record.citizens,
            ));
            report.discovered += 1;
        }

        Ok((batch, report))
    }

    async fn pending_submission(&self, event: &LedgerCreationEvent) -> NationResult<Option<NationRecord>> {
        let Some(hash) = &event.tx_hash else {
            return Ok(None);
        };
        let predicate = Predicate::account(&self.account)
            .and(Predicate::tx_hash(hash))
            .and(Predicate::tx_type(TxJobType::Create));
        Ok(self.store.query(&predicate).await?.into_iter().next())
    }

    async fn confirmed_record(&self, contract_id: ContractId) -> NationResult<Option<NationRecord>> {
        let predicate = Predicate::account(&self.account).and(Predicate::contract(contract_id));
        Ok(self.store.query(&predicate).await?.into_iter().next())
    }
}

impl Drop for ReconciliationEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("account", &self.account)
            .field("config", &self.config)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
