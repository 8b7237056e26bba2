//! Nation record definitions
//!
//! A nation starts life as a local draft, is submitted to the ledger, and is
//! confirmed once the ledger emits a creation event for it. The content
//! fields are an opaque payload to the core: they are copied verbatim from
//! draft to ledger submission and back from ledger metadata.

use serde::{Deserialize, Serialize};

use crate::{AccountId, ContractId, LocalId, NationError, NationResult, TransactionJob};

/// Editable content of a nation, shaped like the ledger payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NationContent {
    pub nation_name: String,
    pub nation_description: String,
    pub exists: bool,
    pub virtual_nation: bool,
    pub nation_code: String,
    pub law_enforcement_mechanism: String,
    pub profit: bool,
    pub non_citizen_use: bool,
    pub diplomatic_recognition: bool,
    pub decision_making_process: String,
    pub governance_service: String,
}

impl NationContent {
    pub fn named(name: impl Into<String>) -> Self {
        NationContent {
            nation_name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.nation_description = description.into();
        self
    }

    /// Encode as the JSON payload sent with a create transaction
    pub fn to_ledger_json(&self) -> NationResult<String> {
        serde_json::to_string(self).map_err(|e| NationError::WriteFailed(e.to_string()))
    }

    /// Decode the metadata the ledger stores for a record
    pub fn from_ledger_json(contract_id: ContractId, json: &str) -> NationResult<Self> {
        serde_json::from_str(json).map_err(|e| NationError::InvalidMetadata {
            contract_id,
            reason: e.to_string(),
        })
    }
}

/// A nation, draft or confirmed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NationRecord {
    pub local_id: LocalId,
    pub account_id: AccountId,
    /// Ledger id; `None` until the submission is confirmed
    pub id_in_smart_contract: Option<ContractId>,
    pub content: NationContent,
    pub joined: bool,
    pub citizens: u64,
    /// True once the record is ledger-confirmed
    pub created: bool,
    /// Present while a ledger-affecting operation is outstanding
    pub tx: Option<TransactionJob>,
}

impl NationRecord {
    /// Build a fresh draft
    pub fn draft(local_id: LocalId, account_id: AccountId, content: NationContent) -> Self {
        NationRecord {
            local_id,
            account_id,
            id_in_smart_contract: None,
            content,
            joined: false,
            citizens: 0,
            created: false,
            tx: None,
        }
    }

    /// Build a record discovered on the ledger with no local counterpart
    pub fn confirmed(
        local_id: LocalId,
        account_id: AccountId,
        contract_id: ContractId,
        content: NationContent,
        joined: bool,
        citizens: u64,
    ) -> Self {
        NationRecord {
            local_id,
            account_id,
            id_in_smart_contract: Some(contract_id),
            content,
            joined,
            citizens,
            created: true,
            tx: None,
        }
    }

    /// Submitted records have a ledger id and their draft fields are frozen
    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.id_in_smart_contract.is_some()
    }

    /// Mutation gate: no job, or the job is no longer pending
    #[inline]
    pub fn can_mutate(&self) -> bool {
        match &self.tx {
            None => true,
            Some(job) => !job.is_pending(),
        }
    }

    /// Fail with `AlreadySubmitted` if the draft fields are frozen
    pub fn ensure_draft(&self) -> NationResult<()> {
        if self.is_submitted() {
            return Err(NationError::AlreadySubmitted(self.local_id));
        }
        Ok(())
    }

    /// Fail with `StateLocked` if a transaction is pending
    pub fn ensure_mutable(&self) -> NationResult<()> {
        if !self.can_mutate() {
            return Err(NationError::StateLocked(self.local_id));
        }
        Ok(())
    }
}
