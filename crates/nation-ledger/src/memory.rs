//! In-memory nation contract
//!
//! Transactions are queued when submitted and take effect on `mine()`, so a
//! caller can observe the window between "hash returned" and "confirmed".
//! Creation events go to every live subscriber as they are mined and are
//! replayed from the requested block on `reset_event_cursor`. Delivery runs
//! on spawned tasks, so mining and replay need a Tokio runtime.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use nation_core::{
    AccountId, ContractId, LedgerCreationEvent, NationError, NationResult, TxHash,
    DEV_CONTRACT_CREATION_BLOCK,
};

use crate::{EventSender, EventSubscription, LedgerGateway, TxReceipt, SUBSCRIPTION_BUFFER};

/// Gateway methods, for failure injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerCall {
    Create,
    Join,
    Leave,
    Count,
    MemberCount,
    Metadata,
    JoinedIds,
    ResetCursor,
}

#[derive(Debug)]
enum PendingTx {
    Create { hash: TxHash, payload: String, sender: AccountId },
    Join { id: ContractId, member: AccountId },
    Leave { id: ContractId, member: AccountId },
}

#[derive(Debug)]
struct MinedNation {
    id: ContractId,
    metadata: String,
    tx_hash: TxHash,
    block: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    nations: Vec<MinedNation>,
    members: HashMap<ContractId, BTreeSet<AccountId>>,
    pending: VecDeque<PendingTx>,
    subscribers: HashMap<u64, EventSender>,
    forced_hashes: VecDeque<TxHash>,
    failing: HashSet<LedgerCall>,
    block: u64,
    nonce: u64,
    duplicate_emissions: u32,
    malformed_joined_ids: bool,
}

/// In-memory ledger gateway bound to one signing account
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    address: AccountId,
    state: Arc<Mutex<LedgerState>>,
    next_subscription: Arc<AtomicU64>,
}

impl MemoryLedger {
    pub fn new(address: AccountId) -> Self {
        MemoryLedger {
            address,
            state: Arc::new(Mutex::new(LedgerState {
                block: DEV_CONTRACT_CREATION_BLOCK,
                ..Default::default()
            })),
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Same ledger, signing as a different account
    pub fn signer(&self, address: AccountId) -> Self {
        MemoryLedger {
            address,
            state: Arc::clone(&self.state),
            next_subscription: Arc::clone(&self.next_subscription),
        }
    }

    pub fn address(&self) -> &AccountId {
        &self.address
    }

    /// Emit every replayed creation this many extra times
    pub fn set_duplicate_emissions(&self, extra: u32) {
        self.state.lock().duplicate_emissions = extra;
    }

    /// Answer joined-id queries with an object instead of a list
    pub fn set_malformed_joined_ids(&self, malformed: bool) {
        self.state.lock().malformed_joined_ids = malformed;
    }

    /// Hand out `hash` for the next state-changing call
    pub fn force_next_hash(&self, hash: TxHash) {
        self.state.lock().forced_hashes.push_back(hash);
    }

    pub fn fail(&self, call: LedgerCall) {
        self.state.lock().failing.insert(call);
    }

    pub fn recover(&self, call: LedgerCall) {
        self.state.lock().failing.remove(&call);
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Transactions submitted but not yet mined
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Publish a nation directly, as if another client had created it
    pub fn publish(&self, metadata: impl Into<String>) -> ContractId {
        let mut state = self.state.lock();
        let hash = Self::derive_hash(&mut state, "external");
        let event = Self::mine_create(&mut state, hash, metadata.into(), None);
        let id = event.contract_id;
        Self::broadcast(&state, vec![event]);
        id
    }

    /// Apply every queued transaction in one block
    pub fn mine(&self) -> usize {
        let mut state = self.state.lock();
        state.block += 1;
        let mut created = Vec::new();
        let mut applied = 0;

        while let Some(tx) = state.pending.pop_front() {
            applied += 1;
            match tx {
                PendingTx::Create { hash, payload, sender } => {
                    created.push(Self::mine_create(&mut state, hash, payload, Some(sender)));
                }
                PendingTx::Join { id, member } => {
                    state.members.entry(id).or_default().insert(member);
                }
                PendingTx::Leave { id, member } => {
                    if let Some(members) = state.members.get_mut(&id) {
                        members.remove(&member);
                    }
                }
            }
        }

        tracing::debug!(block = state.block, applied, created = created.len(), "ledger block mined");
        Self::broadcast(&state, created);
        applied
    }

    fn mine_create(
        state: &mut LedgerState,
        hash: TxHash,
        metadata: String,
        founder: Option<AccountId>,
    ) -> LedgerCreationEvent {
        let id = ContractId::new(state.nations.len() as u64);
        let block = state.block;
        state.nations.push(MinedNation {
            id,
            metadata,
            tx_hash: hash.clone(),
            block,
        });
        let members = state.members.entry(id).or_default();
        if let Some(founder) = founder {
            members.insert(founder);
        }
        LedgerCreationEvent::new(id, Some(hash))
    }

    fn broadcast(state: &LedgerState, events: Vec<LedgerCreationEvent>) {
        if events.is_empty() {
            return;
        }
        for sender in state.subscribers.values() {
            Self::spawn_delivery(sender.clone(), events.clone());
        }
    }

    /// Deliver in the background so the caller never blocks on a full channel
    fn spawn_delivery(sender: EventSender, events: Vec<LedgerCreationEvent>) {
        tokio::spawn(async move {
            for event in events {
                if sender.send(event).await.is_err() {
                    break; // Subscriber dropped
                }
            }
        });
    }

    fn derive_hash(state: &mut LedgerState, label: &str) -> TxHash {
        if let Some(forced) = state.forced_hashes.pop_front() {
            return forced;
        }
        state.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        hasher.update(state.nonce.to_le_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        TxHash::new(format!("0x{hex}"))
    }

    fn check(state: &LedgerState, call: LedgerCall) -> NationResult<()> {
        if state.failing.contains(&call) {
            return Err(NationError::LedgerCallFailed(format!("{call:?} rejected by ledger")));
        }
        Ok(())
    }

    fn require_nation(state: &LedgerState, id: ContractId) -> NationResult<&MinedNation> {
        state
            .nations
            .get(id.get() as usize)
            .ok_or_else(|| NationError::LedgerCallFailed(format!("nation {id} does not exist")))
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn create_record(&self, payload: &str) -> NationResult<TxReceipt> {
        let mut state = self.state.lock();
        Self::check(&state, LedgerCall::Create)?;
        let hash = Self::derive_hash(&mut state, "create");
        state.pending.push_back(PendingTx::Create {
            hash: hash.clone(),
            payload: payload.to_string(),
            sender: self.address.clone(),
        });
        Ok(TxReceipt::new(hash))
    }

    async fn join_record(&self, id: ContractId) -> NationResult<TxReceipt> {
        let mut state = self.state.lock();
        Self::check(&state, LedgerCall::Join)?;
        Self::require_nation(&state, id)?;
        let hash = Self::derive_hash(&mut state, "join");
        state.pending.push_back(PendingTx::Join {
            id,
            member: self.address.clone(),
        });
        Ok(TxReceipt::new(hash))
    }

    async fn leave_record(&self, id: ContractId) -> NationResult<TxReceipt> {
        let mut state = self.state.lock();
        Self::check(&state, LedgerCall::Leave)?;
        Self::require_nation(&state, id)?;
        let hash = Self::derive_hash(&mut state, "leave");
        state.pending.push_back(PendingTx::Leave {
            id,
            member: self.address.clone(),
        });
        Ok(TxReceipt::new(hash))
    }

    async fn count_records(&self) -> NationResult<u64> {
        let state = self.state.lock();
        Self::check(&state, LedgerCall::Count)?;
        Ok(state.nations.len() as u64)
    }

    async fn member_count(&self, id: ContractId) -> NationResult<u64> {
        let state = self.state.lock();
        Self::check(&state, LedgerCall::MemberCount)?;
        Self::require_nation(&state, id)?;
        Ok(state.members.get(&id).map_or(0, |m| m.len() as u64))
    }

    async fn metadata(&self, id: ContractId) -> NationResult<String> {
        let state = self.state.lock();
        Self::check(&state, LedgerCall::Metadata)?;
        Ok(Self::require_nation(&state, id)?.metadata.clone())
    }

    async fn joined_record_ids(&self, address: &AccountId) -> NationResult<Value> {
        let state = self.state.lock();
        Self::check(&state, LedgerCall::JoinedIds)?;
        let joined: Vec<u64> = state
            .members
            .iter()
            .filter(|(_, members)| members.contains(address))
            .map(|(id, _)| id.get())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if state.malformed_joined_ids {
            let object: serde_json::Map<String, Value> = joined
                .iter()
                .enumerate()
                .map(|(i, id)| (i.to_string(), json!(id)))
                .collect();
            return Ok(Value::Object(object));
        }
        Ok(json!(joined))
    }

    fn subscribe_created(&self) -> NationResult<EventSubscription> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = tokio::sync::mpsc::channel(SUBSCRIPTION_BUFFER);
        self.state.lock().subscribers.insert(id, tx);

        let state = Arc::clone(&self.state);
        tracing::debug!(subscription = id, "creation listener attached");
        Ok(EventSubscription::new(id, rx, move |id| {
            state.lock().subscribers.remove(&id);
            tracing::debug!(subscription = id, "creation listener removed");
        }))
    }

    async fn reset_event_cursor(&self, block: u64) -> NationResult<()> {
        let state = self.state.lock();
        Self::check(&state, LedgerCall::ResetCursor)?;

        let mut replay = Vec::new();
        for nation in state.nations.iter().filter(|n| n.block >= block) {
            for _ in 0..=state.duplicate_emissions {
                replay.push(LedgerCreationEvent::new(nation.id, Some(nation.tx_hash.clone())));
            }
        }
        tracing::debug!(from_block = block, events = replay.len(), "replaying creation events");
        Self::broadcast(&state, replay);
        Ok(())
    }
}
