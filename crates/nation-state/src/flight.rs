//! Per-account single-flight guard for reconciliation
//!
//! A pass reads, decides, then writes. Two overlapping passes for the same
//! account could both decide a ledger record is unknown and create it twice,
//! so passes are serialized per account. Different accounts never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use nation_core::{AccountId, NationError, NationResult};

/// What a re-entrant `reconcile()` does while a pass is in flight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReentryPolicy {
    /// Wait for the running pass, then run
    #[default]
    Queue,
    /// Fail fast with `ReconcileInProgress`
    Reject,
}

/// Held for the duration of one pass
pub type FlightGuard = OwnedMutexGuard<()>;

/// Registry of per-account reconciliation locks
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        AccountLocks::default()
    }

    fn lock_for(&self, account: &AccountId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(account.clone()).or_default())
    }

    /// Enter the flight for `account` under `policy`
    pub async fn acquire(&self, account: &AccountId, policy: ReentryPolicy) -> NationResult<FlightGuard> {
        let lock = self.lock_for(account);
        match policy {
            ReentryPolicy::Queue => Ok(lock.lock_owned().await),
            ReentryPolicy::Reject => lock.try_lock_owned().map_err(|_| {
                tracing::warn!(account = %account, "reconciliation already in flight");
                NationError::ReconcileInProgress(account.clone())
            }),
        }
    }

    /// Whether a pass currently holds the account's flight
    pub fn is_busy(&self, account: &AccountId) -> bool {
        let Some(lock) = self.locks.lock().get(account).cloned() else {
            return false;
        };
        let busy = lock.try_lock().is_err();
        busy
    }

    /// Accounts that have ever entered a flight
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}
