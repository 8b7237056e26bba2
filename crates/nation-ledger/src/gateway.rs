//! Ledger gateway abstraction

use async_trait::async_trait;
use serde_json::Value;

use nation_core::{AccountId, ContractId, NationResult, TxHash};

use crate::EventSubscription;

/// What a state-changing ledger call hands back
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
}

impl TxReceipt {
    pub fn new(hash: TxHash) -> Self {
        TxReceipt { hash }
    }
}

/// Client of the nation contract
///
/// Every failure surfaces as `NationError::LedgerCallFailed`. Calls are not
/// retried by callers.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Submit a create transaction carrying the JSON payload
    async fn create_record(&self, payload: &str) -> NationResult<TxReceipt>;

    async fn join_record(&self, id: ContractId) -> NationResult<TxReceipt>;

    async fn leave_record(&self, id: ContractId) -> NationResult<TxReceipt>;

    /// Total number of records the contract holds
    async fn count_records(&self) -> NationResult<u64>;

    /// Citizen count of one record
    async fn member_count(&self, id: ContractId) -> NationResult<u64>;

    /// JSON metadata stored for a record
    async fn metadata(&self, id: ContractId) -> NationResult<String>;

    /// Ids joined by `address`, as the contract returns them
    ///
    /// The contract has been seen answering with an object instead of a list;
    /// callers run the result through [`coerce_joined_ids`].
    async fn joined_record_ids(&self, address: &AccountId) -> NationResult<Value>;

    /// Open a creation-event subscription; dropping the handle unsubscribes
    fn subscribe_created(&self) -> NationResult<EventSubscription>;

    /// Rewind event delivery so every creation from `block` on is emitted again
    async fn reset_event_cursor(&self, block: u64) -> NationResult<()>;
}

/// Turn the raw joined-ids answer into contract ids
///
/// Anything but a list is treated as "joined nothing". Numeric strings are
/// accepted since big-number encodings come back that way.
pub fn coerce_joined_ids(value: &Value) -> Vec<ContractId> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .map(ContractId::new)
            .collect(),
        other => {
            tracing::warn!(kind = value_kind(other), "joined ids were not a list; ignoring");
            Vec::new()
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_is_mapped() {
        let ids = coerce_joined_ids(&json!([1, "2", 3]));
        assert_eq!(ids, vec![ContractId::new(1), ContractId::new(2), ContractId::new(3)]);
    }

    #[test]
    fn test_object_becomes_empty() {
        assert!(coerce_joined_ids(&json!({"0": 4, "1": 5})).is_empty());
        assert!(coerce_joined_ids(&Value::Null).is_empty());
    }

    #[test]
    fn test_non_numeric_entries_are_skipped() {
        let ids = coerce_joined_ids(&json!([1, null, "x", -3]));
        assert_eq!(ids, vec![ContractId::new(1)]);
    }
}
