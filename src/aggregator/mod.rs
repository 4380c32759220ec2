//! Aggregator integration module.
//!
//! Domain types for Salt Edge logins, accounts and transactions, and the fetchers that page
//! through the Salt Edge list endpoints and record what they saw in the record cache.

/// Paging fetchers that decode and cache aggregator records
mod fetchers;
/// Type definitions for aggregator payloads
mod types;

pub use fetchers::AggregatorFetcher;
pub use types::*;
