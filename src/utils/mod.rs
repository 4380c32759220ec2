//!
//! Utility module for the sync service.
//!
//! Re-exports identifier normalization, query building, record decoding and formatting helpers
//! used throughout the codebase.
/// Identifier normalization, query building, record decoding and amount formatting
pub mod index;

pub use index::{decode_items, format_amount, normalize_identifier, with_query};
