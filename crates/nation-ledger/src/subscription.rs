//! Creation-event subscriptions

use std::fmt;

use tokio::sync::mpsc;

use nation_core::LedgerCreationEvent;

/// Buffer of a subscription channel
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// Creation event receiver channel
pub type EventReceiver = mpsc::Receiver<LedgerCreationEvent>;

/// Creation event sender channel
pub type EventSender = mpsc::Sender<LedgerCreationEvent>;

type Unsubscribe = Box<dyn FnOnce(u64) + Send>;

/// Live subscription to ledger creation events
///
/// Dropping the handle removes the listener from the gateway.
pub struct EventSubscription {
    id: u64,
    receiver: EventReceiver,
    unsubscribe: Option<Unsubscribe>,
}

impl EventSubscription {
    pub fn new(id: u64, receiver: EventReceiver, unsubscribe: impl FnOnce(u64) + Send + 'static) -> Self {
        EventSubscription {
            id,
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Create a sender/subscription pair that nothing else tracks
    pub fn detached(id: u64) -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (tx, EventSubscription::new(id, rx, |_| {}))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event; `None` once the gateway side closed
    pub async fn recv(&mut self) -> Option<LedgerCreationEvent> {
        self.receiver.recv().await
    }

    /// Remove the listener now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            self.receiver.close();
            unsubscribe(self.id);
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
