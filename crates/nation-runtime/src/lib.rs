//! Nation Runtime - Per-account composition and background reconciliation
//!
//! This crate wires the pieces together for one account:
//! - `RuntimeConfig` loaded from JSON and environment overrides
//! - Tracing subscriber setup in the configured format (pretty or JSON,
//!   `RUST_LOG` filtering) via `RuntimeConfig::init_tracing`
//! - `AccountRuntime` owning the lifecycle controller and the
//!   reconciliation engine, with an optional periodic reconcile loop

pub mod config;
pub mod logging;
pub mod runtime;

pub use config::*;
pub use logging::*;
pub use runtime::*;
