//! Creation-event collector
//!
//! Accumulates emissions from a subscription into a set keyed by contract
//! id and completes once the set accounts for the expected count. Extra and
//! duplicate emissions are absorbed.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use nation_core::{CreationEventSet, NationError, NationResult};

use crate::EventSubscription;

/// Cancels an in-flight collection
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Waits for `expected` distinct creation events
#[derive(Debug)]
pub struct EventCollector {
    expected: u64,
    timeout: Duration,
    cancel: watch::Receiver<bool>,
}

impl EventCollector {
    pub fn new(expected: u64, timeout: Duration) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let collector = EventCollector {
            expected,
            timeout,
            cancel: rx,
        };
        (collector, CancelHandle { tx: std::sync::Arc::new(tx) })
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Drain the subscription until the expected count is reached
    pub async fn collect(mut self, subscription: &mut EventSubscription) -> NationResult<CreationEventSet> {
        let mut events = CreationEventSet::new();
        if self.expected == 0 {
            return Ok(events);
        }

        let deadline = Instant::now() + self.timeout;
        let mut cancel_live = true;

        loop {
            if *self.cancel.borrow() {
                return Err(NationError::Cancelled);
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        expected = self.expected,
                        observed = events.len(),
                        "creation event collection timed out"
                    );
                    return Err(NationError::CollectTimeout {
                        expected: self.expected,
                        observed: events.len() as u64,
                    });
                }
                changed = self.cancel.changed(), if cancel_live => {
                    if changed.is_err() {
                        // Handle dropped without cancelling
                        cancel_live = false;
                    }
                }
                event = subscription.recv() => {
                    let Some(event) = event else {
                        return Err(NationError::LedgerCallFailed(format!(
                            "event stream closed after {} of {} nations",
                            events.len(),
                            self.expected
                        )));
                    };
                    let contract_id = event.contract_id;
                    if events.insert(event) {
                        tracing::trace!(%contract_id, distinct = events.len(), "creation event collected");
                    }
                    if events.len() as u64 >= self.expected {
                        tracing::debug!(
                            expected = self.expected,
                            emissions = events.emissions(),
                            "creation events complete"
                        );
                        return Ok(events);
                    }
                }
            }
        }
    }
}
