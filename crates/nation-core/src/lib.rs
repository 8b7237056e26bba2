//! Nation Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by the lifecycle controller and
//! the ledger reconciliation engine:
//! - Identifiers (LocalId, ContractId, AccountId, TxHash)
//! - Nation records and their ledger payload
//! - Transaction jobs and ledger creation events
//! - Per-network constants and the error taxonomy

pub mod id;
pub mod nation;
pub mod job;
pub mod event;
pub mod network;
pub mod error;

pub use id::*;
pub use nation::*;
pub use job::*;
pub use event::*;
pub use network::*;
pub use error::*;
