//! Chaotic creation-event delivery
//!
//! Wraps a gateway and re-delivers its creation events through a hostile
//! channel:
//! - Duplication (each event sent up to `max_duplicates` extra times)
//! - Reordering (every copy is delayed by a random jitter)
//!
//! Events are never dropped: delivery stays at-least-once. All randomness
//! comes from one seeded `StdRng`, so a seed reproduces the same decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use nation_core::{AccountId, ContractId, LedgerCreationEvent, NationResult};
use nation_ledger::{EventSender, EventSubscription, LedgerGateway, TxReceipt, SUBSCRIPTION_BUFFER};

/// Chaos configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    pub seed: u64,
    /// Probability an event is duplicated at all
    pub duplicate_prob: f64,
    /// Upper bound on extra copies of a duplicated event
    pub max_duplicates: u32,
    /// Upper bound on per-copy delivery delay
    pub max_jitter: Duration,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            seed: 0x5eed,
            duplicate_prob: 0.3,
            max_duplicates: 3,
            max_jitter: Duration::from_millis(5),
        }
    }
}

impl ChaosConfig {
    pub fn with_seed(seed: u64) -> Self {
        ChaosConfig {
            seed,
            ..Default::default()
        }
    }

    /// Every event duplicated, heavy reordering
    pub fn hostile(seed: u64) -> Self {
        ChaosConfig {
            seed,
            duplicate_prob: 1.0,
            max_duplicates: 5,
            max_jitter: Duration::from_millis(20),
        }
    }
}

/// Gateway wrapper delivering creation events chaotically
pub struct ChaosLedger<G> {
    inner: G,
    config: ChaosConfig,
    rng: Arc<Mutex<StdRng>>,
    delivered: Arc<AtomicU64>,
}

impl<G: LedgerGateway> ChaosLedger<G> {
    pub fn new(inner: G, config: ChaosConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        ChaosLedger {
            inner,
            config,
            rng: Arc::new(Mutex::new(rng)),
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// Raw emissions handed to subscribers so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }
}

/// Copies and their delays for one upstream event
fn plan(rng: &Mutex<StdRng>, config: &ChaosConfig) -> Vec<Duration> {
    let mut rng = rng.lock();
    let extra = if config.max_duplicates > 0 && rng.gen_bool(config.duplicate_prob.clamp(0.0, 1.0)) {
        rng.gen_range(1..=config.max_duplicates)
    } else {
        0
    };
    let max_jitter = config.max_jitter.as_micros() as u64;
    (0..=extra)
        .map(|_| Duration::from_micros(rng.gen_range(0..=max_jitter)))
        .collect()
}

fn deliver(sender: &EventSender, event: LedgerCreationEvent, delay: Duration, delivered: &Arc<AtomicU64>) {
    let sender = sender.clone();
    let delivered = Arc::clone(delivered);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if sender.send(event).await.is_ok() {
            delivered.fetch_add(1, Ordering::SeqCst);
        }
    });
}

#[async_trait]
impl<G: LedgerGateway + 'static> LedgerGateway for ChaosLedger<G> {
    async fn create_record(&self, payload: &str) -> NationResult<TxReceipt> {
        self.inner.create_record(payload).await
    }

    async fn join_record(&self, id: ContractId) -> NationResult<TxReceipt> {
        self.inner.join_record(id).await
    }

    async fn leave_record(&self, id: ContractId) -> NationResult<TxReceipt> {
        self.inner.leave_record(id).await
    }

    async fn count_records(&self) -> NationResult<u64> {
        self.inner.count_records().await
    }

    async fn member_count(&self, id: ContractId) -> NationResult<u64> {
        self.inner.member_count(id).await
    }

    async fn metadata(&self, id: ContractId) -> NationResult<String> {
        self.inner.metadata(id).await
    }

    async fn joined_record_ids(&self, address: &AccountId) -> NationResult<Value> {
        self.inner.joined_record_ids(address).await
    }

    fn subscribe_created(&self) -> NationResult<EventSubscription> {
        let mut upstream = self.inner.subscribe_created()?;
        let id = upstream.id();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let rng = Arc::clone(&self.rng);
        let config = self.config.clone();
        let delivered = Arc::clone(&self.delivered);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    event = upstream.recv() => {
                        let Some(event) = event else { break };
                        for delay in plan(&rng, &config) {
                            deliver(&tx, event.clone(), delay, &delivered);
                        }
                    }
                }
            }
            upstream.unsubscribe();
        });

        Ok(EventSubscription::new(id, rx, move |_| {
            let _ = stop_tx.send(());
        }))
    }

    async fn reset_event_cursor(&self, block: u64) -> NationResult<()> {
        self.inner.reset_event_cursor(block).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nation_ledger::{EventCollector, MemoryLedger};

    #[test]
    fn test_same_seed_same_plan() {
        let config = ChaosConfig::with_seed(7);
        let a = Mutex::new(StdRng::seed_from_u64(7));
        let b = Mutex::new(StdRng::seed_from_u64(7));
        for _ in 0..20 {
            assert_eq!(plan(&a, &config), plan(&b, &config));
        }
    }

    #[tokio::test]
    async fn test_hostile_delivery_still_completes() {
        let ledger = MemoryLedger::new(AccountId::new("0xme"));
        for _ in 0..10 {
            ledger.publish("{}");
        }
        let chaos = ChaosLedger::new(ledger.clone(), ChaosConfig::hostile(42));

        let mut sub = chaos.subscribe_created().unwrap();
        chaos.reset_event_cursor(0).await.unwrap();
        let (collector, _cancel) = EventCollector::new(10, Duration::from_secs(5));
        let events = collector.collect(&mut sub).await.unwrap();

        assert_eq!(events.len(), 10);
        assert!(events.emissions() >= 10);

        drop(sub);
        while ledger.subscriber_count() > 0 {
            tokio::task::yield_now().await;
        }
    }
}
