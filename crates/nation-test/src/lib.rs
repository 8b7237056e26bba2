//! Nation Test Harness - Fault injection and end-to-end scenarios
//!
//! This crate provides:
//! - `FaultyStore`, a store wrapper that fails chosen commits
//! - `ChaosLedger`, a gateway wrapper that duplicates and reorders creation
//!   events under a seeded RNG
//! - `TestWorld`, one shared ledger and store with runtimes per account
//! - End-to-end scenario tests

pub mod faulty;
pub mod chaos;
pub mod world;

#[cfg(test)]
mod scenarios;

pub use faulty::*;
pub use chaos::*;
pub use world::*;
