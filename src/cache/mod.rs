//! Local cache of aggregator records.
//!
//! The cache is the only representation of aggregator logins and accounts that survives between
//! passes. Each entry carries a canonical snapshot and its content hash so a changed upstream
//! record is detected and updated in place rather than duplicated.

/// Cache entries, canonical snapshots and content hashing
pub mod entry;
/// `RecordCache` capability and its in-memory and file-backed implementations
pub mod repositories;

pub use entry::{CacheEntry, Cacheable, EntityKind, canonical_snapshot, content_hash};
pub use repositories::{FileRecordCache, InMemoryRecordCache, RecordCache, UpsertOutcome};

/// Error types for cache operations
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	#[error("Entry is a {found}, expected a {expected}")]
	KindMismatch {
		expected: EntityKind,
		found: EntityKind,
	},
}
