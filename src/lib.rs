//! Reconciles bank accounts and transactions from Salt Edge into Firefly III.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod jobs;
pub mod ledger;
pub mod provider;
pub mod sync;
pub mod utils;
