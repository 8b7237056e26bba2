//! Account runtime - composition root for one account
//!
//! Owns the lifecycle controller and the reconciliation engine, sharing one
//! id allocator between them so drafts and discovered records never collide.
//! Optionally runs reconciliation on an interval until shut down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use nation_core::{AccountId, NationError, NationResult};
use nation_ledger::LedgerGateway;
use nation_state::{
    AccountLocks, IdentifierAllocator, LifecycleController, ReconcileReport, ReconciliationEngine,
};
use nation_store::RecordStore;

use crate::RuntimeConfig;

/// Counters over every reconciliation pass the runtime ran
#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub passes: u64,
    pub failures: u64,
    pub confirmed_drafts: u64,
    pub refreshed: u64,
    pub discovered: u64,
    pub last_error: Option<NationError>,
    pub last_pass_duration: Duration,
}

impl RuntimeStats {
    fn record(&mut self, account: &AccountId, result: &NationResult<ReconcileReport>, elapsed: Duration) {
        self.passes += 1;
        self.last_pass_duration = elapsed;
        match result {
            Ok(report) => {
                self.confirmed_drafts += report.confirmed_drafts;
                self.refreshed += report.refreshed;
                self.discovered += report.discovered;
                self.last_error = None;
            }
            Err(e) => {
                self.failures += 1;
                self.last_error = Some(e.clone());
                tracing::warn!(account = %account, error = %e, "reconciliation pass failed");
            }
        }
    }
}

/// Everything one account needs, wired together
pub struct AccountRuntime {
    account: AccountId,
    config: RuntimeConfig,
    controller: LifecycleController,
    engine: Arc<ReconciliationEngine>,
    stats: Arc<Mutex<RuntimeStats>>,
    shutdown: watch::Sender<bool>,
    reconcile_loop: Mutex<Option<JoinHandle<()>>>,
}

/// State every runtime over the same store must share
///
/// One allocator per store keeps local ids unique across accounts; one lock
/// registry keeps passes for the same account serialized across runtimes.
#[derive(Clone, Debug, Default)]
pub struct RuntimeShared {
    pub allocator: Arc<IdentifierAllocator>,
    pub locks: Arc<AccountLocks>,
}

impl AccountRuntime {
    pub fn new(
        account: AccountId,
        ledger: Arc<dyn LedgerGateway>,
        store: Arc<dyn RecordStore>,
        config: RuntimeConfig,
    ) -> Self {
        Self::with_shared(account, ledger, store, config, &RuntimeShared::default())
    }

    pub fn with_shared(
        account: AccountId,
        ledger: Arc<dyn LedgerGateway>,
        store: Arc<dyn RecordStore>,
        config: RuntimeConfig,
        shared: &RuntimeShared,
    ) -> Self {
        let controller = LifecycleController::new(account.clone(), Arc::clone(&ledger), Arc::clone(&store))
            .with_allocator(Arc::clone(&shared.allocator));
        let engine = ReconciliationEngine::new(account.clone(), ledger, store, config.reconcile_config())
            .with_allocator(Arc::clone(&shared.allocator))
            .with_locks(Arc::clone(&shared.locks));
        let (shutdown, _) = watch::channel(false);

        tracing::info!(
            account = %account,
            network = %config.network,
            contract = config.network.contract_address(),
            start_block = config.start_block(),
            "account runtime ready"
        );

        AccountRuntime {
            account,
            config,
            controller,
            engine: Arc::new(engine),
            stats: Arc::new(Mutex::new(RuntimeStats::default())),
            shutdown,
            reconcile_loop: Mutex::new(None),
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats.lock().clone()
    }

    /// Run one pass now, counting it in the stats
    pub async fn reconcile_now(&self) -> NationResult<ReconcileReport> {
        let started = Instant::now();
        let result = self.engine.reconcile().await;
        self.stats.lock().record(&self.account, &result, started.elapsed());
        result
    }

    pub fn is_loop_running(&self) -> bool {
        self.reconcile_loop
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start the periodic loop
    ///
    /// Returns `false` if the interval is disabled, the runtime was shut down,
    /// or the loop already runs. Failed passes are counted and logged; the
    /// loop keeps going.
    pub fn spawn_reconcile_loop(&self) -> bool {
        let Some(interval) = self.config.reconcile_interval() else {
            return false;
        };
        if *self.shutdown.borrow() || self.is_loop_running() {
            return false;
        }

        let engine = Arc::clone(&self.engine);
        let stats = Arc::clone(&self.stats);
        let account = self.account.clone();
        let mut shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }

                let started = Instant::now();
                let result = engine.reconcile().await;
                if matches!(result, Err(NationError::Disposed)) {
                    break;
                }
                stats.lock().record(&account, &result, started.elapsed());
            }
            tracing::debug!(account = %account, "reconcile loop stopped");
        });

        *self.reconcile_loop.lock() = Some(handle);
        tracing::info!(account = %self.account, interval_ms = self.config.reconcile_interval_ms, "reconcile loop started");
        true
    }

    /// Stop the loop and dispose the engine
    ///
    /// An in-flight pass is cancelled and its listener removed. Later
    /// `reconcile_now` calls fail with `Disposed`.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.engine.dispose();

        let handle = self.reconcile_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(account = %self.account, error = %e, "reconcile loop ended abnormally");
            }
        }
        tracing::info!(account = %self.account, "account runtime shut down");
    }
}

impl Drop for AccountRuntime {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.engine.dispose();
        if let Some(handle) = self.reconcile_loop.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nation_core::NationContent;
    use nation_ledger::{LedgerCall, MemoryLedger};
    use nation_store::MemoryStore;

    struct Fixture {
        ledger: MemoryLedger,
        store: Arc<MemoryStore>,
        runtime: AccountRuntime,
    }

    fn fixture(config: RuntimeConfig) -> Fixture {
        let account = AccountId::new("0xme");
        let ledger = MemoryLedger::new(account.clone());
        let store = Arc::new(MemoryStore::new());
        let runtime = AccountRuntime::new(account, Arc::new(ledger.clone()), store.clone(), config);
        Fixture { ledger, store, runtime }
    }

    fn quick() -> RuntimeConfig {
        RuntimeConfig {
            collect_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_then_reconcile() {
        let f = fixture(quick());
        let submitted = f
            .runtime
            .controller()
            .save_and_submit(NationContent::named("Test"))
            .await
            .unwrap();
        f.ledger.mine();
        f.ledger.publish(NationContent::named("Other").to_ledger_json().unwrap());

        let report = f.runtime.reconcile_now().await.unwrap();
        assert_eq!(report.confirmed_drafts, 1);
        assert_eq!(report.discovered, 1);

        // Draft and discovered record drew from the same allocator
        let ids: Vec<u64> = f.store.snapshot().iter().map(|r| r.local_id.get()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(submitted.local_id.get(), 1);

        let stats = f.runtime.stats();
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.confirmed_drafts, 1);
        assert_eq!(stats.discovered, 1);
    }

    #[tokio::test]
    async fn test_failed_pass_is_counted() {
        let f = fixture(quick());
        f.ledger.fail(LedgerCall::Count);

        assert!(f.runtime.reconcile_now().await.is_err());
        let stats = f.runtime.stats();
        assert_eq!(stats.failures, 1);
        assert!(matches!(stats.last_error, Some(NationError::LedgerCallFailed(_))));
    }

    #[tokio::test]
    async fn test_loop_disabled_by_default() {
        let f = fixture(quick());
        assert!(!f.runtime.spawn_reconcile_loop());
        assert!(!f.runtime.is_loop_running());
    }

    #[tokio::test]
    async fn test_loop_converges_and_stops() {
        let f = fixture(RuntimeConfig {
            reconcile_interval_ms: 10,
            ..quick()
        });
        f.ledger.publish("{}");
        f.ledger.publish("{}");

        assert!(f.runtime.spawn_reconcile_loop());
        assert!(!f.runtime.spawn_reconcile_loop());

        let deadline = Instant::now() + Duration::from_secs(5);
        while f.store.len() < 2 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.store.len(), 2);

        f.runtime.shutdown().await;
        assert!(!f.runtime.is_loop_running());
        assert_eq!(f.ledger.subscriber_count(), 0);
        assert_eq!(f.runtime.reconcile_now().await.unwrap_err(), NationError::Disposed);
        assert!(!f.runtime.spawn_reconcile_loop());
    }
}
