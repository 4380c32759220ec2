//! Cache entries and change detection.
//!
//! A cached record is stored as a canonical JSON snapshot (object keys sorted at every level)
//! together with the SHA-256 digest of that snapshot. Two sightings of the same record produce
//! the same digest regardless of field order in the provider's payload.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

use super::CacheError;

/// Kind of aggregator entity held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Login,
    Account,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Login => "login",
            EntityKind::Account => "account",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record type that can be stored in the cache.
pub trait Cacheable: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    /// Stable id assigned by the aggregator.
    fn external_id(&self) -> &str;
}

/// One cached aggregator record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub kind: EntityKind,
    pub external_id: String,
    /// Name of the provider the record came from.
    pub provider: String,
    /// Canonical JSON snapshot of the record.
    pub snapshot: String,
    /// Hex SHA-256 of `snapshot`.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Build a fresh entry for `record`.
    pub fn of<T: Cacheable>(provider: &str, record: &T) -> Result<Self, CacheError> {
        let snapshot = canonical_snapshot(record)?;
        let content_hash = content_hash(&snapshot);
        let now = Utc::now();
        Ok(Self {
            kind: T::KIND,
            external_id: record.external_id().to_string(),
            provider: provider.to_string(),
            snapshot,
            content_hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Decode the snapshot back into its record type.
    pub fn decode<T: Cacheable>(&self) -> Result<T, CacheError> {
        if self.kind != T::KIND {
            return Err(CacheError::KindMismatch {
                expected: T::KIND,
                found: self.kind,
            });
        }
        Ok(serde_json::from_str(&self.snapshot)?)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Serialize `record` to JSON with object keys sorted at every level.
pub fn canonical_snapshot<T: Serialize>(record: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(record)?;
    serde_json::to_string(&canonicalize(value))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Hex encoded SHA-256 digest of a snapshot.
pub fn content_hash(snapshot: &str) -> String {
    hex::encode(Sha256::digest(snapshot.as_bytes()))
}
