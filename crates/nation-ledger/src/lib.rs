//! Nation Ledger - Gateway to the authoritative append-only ledger
//!
//! This crate provides:
//! - The `LedgerGateway` trait consumed by lifecycle and reconciliation
//! - Explicit subscribe/unsubscribe handles for creation events
//! - A bounded, cancellable collector for at-least-once event delivery
//! - An in-memory ledger for local runs and tests

pub mod gateway;
pub mod subscription;
pub mod collector;
pub mod memory;

pub use gateway::*;
pub use subscription::*;
pub use collector::*;
pub use memory::{LedgerCall, MemoryLedger};
