//! Ledger integration module.
//!
//! Types for Firefly III accounts and transactions, the fetchers that load the per-pass ledger
//! snapshot, and the writer that creates accounts and transactions.

/// Paging fetchers for ledger accounts and transactions
mod fetchers;
/// Type definitions for ledger resources and creation payloads
mod types;
/// Creation payloads and create calls
mod writer;

pub use fetchers::LedgerFetcher;
pub use types::*;
pub use writer::LedgerWriter;
