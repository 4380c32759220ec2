//! Reconciliation module
//!
//! This module holds the reconciliation engine that mirrors aggregator accounts and transactions
//! into the ledger. It is composed of several submodules:
//!
//! - `orchestrator`: runs a pass through the ordered stage list and reports every stage outcome.
//! - `match_engine`: decides whether an aggregator record already has a ledger counterpart.
//! - `strategies`: the ordered identity strategies used by the match engine (IBAN, account number).
//! - `snapshot`: the per-pass set of known ledger accounts.
//! - `events`: event types, the handler trait and the dispatcher the orchestrator publishes through.
//! - `progress_tracker`: per-stage counters.
//! - `types`: the error taxonomy and the stage and pass report types.

/// Event system for observing a pass
pub mod events;
/// Identity resolution against the ledger snapshot
pub mod match_engine;
/// Main coordinator for a reconciliation pass
pub mod orchestrator;
/// Per-stage progress counters
pub mod progress_tracker;
/// Ledger accounts known during a pass
pub mod snapshot;
/// Ordered identity matching strategies
pub mod strategies;
/// Errors, stages and pass reports
pub mod types;

pub use match_engine::{MatchEngine, MatchResult};
pub use orchestrator::*;
pub use snapshot::LedgerSnapshot;
pub use types::*;
