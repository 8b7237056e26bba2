//! Nation Store - Transactional object store for nation records
//!
//! This crate implements the local mutable side of reconciliation:
//! - Typed query predicates and sort fields
//! - Staged write batches committed all-or-nothing
//! - Record invariants enforced at commit time
//! - An in-memory store implementation

pub mod query;
pub mod batch;
pub mod store;
pub mod memory;

pub use query::*;
pub use batch::*;
pub use store::*;
pub use memory::*;
