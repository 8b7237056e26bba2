//! Nation State Engine - Lifecycle transitions and ledger reconciliation
//!
//! This crate implements:
//! - Local id allocation with batch reservation
//! - Draft CRUD and submit/join/leave transitions behind the mutation gate
//! - Transaction job creation
//! - Per-account single-flight serialization of reconciliation passes
//! - Three-way merge of ledger creation events into the local store

pub mod allocator;
pub mod jobs;
pub mod flight;
pub mod lifecycle;
pub mod reconcile;

pub use allocator::*;
pub use jobs::*;
pub use flight::*;
pub use lifecycle::*;
pub use reconcile::*;
