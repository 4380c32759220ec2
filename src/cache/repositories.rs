use super::entry::{CacheEntry, EntityKind};
use super::CacheError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// What an upsert did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
	/// First sighting of the record.
	Created,
	/// Seen before with different content; snapshot and hash replaced.
	Updated,
	/// Seen before with identical content.
	Unchanged,
}

/// Store of previously seen aggregator records.
///
/// At most one live entry exists per `(kind, external_id)`. Entries are never removed, only
/// soft-deleted; a soft-deleted entry that is sighted again is revived.
#[async_trait::async_trait]
pub trait RecordCache: Send + Sync {
	async fn find_by_external_id(
		&self,
		kind: EntityKind,
		external_id: &str,
	) -> Result<Option<CacheEntry>, CacheError>;

	async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, CacheError>;

	/// All live entries of a kind, ordered by external id.
	async fn list(&self, kind: EntityKind) -> Result<Vec<CacheEntry>, CacheError>;

	/// Mark an entry deleted. Returns false when no such entry exists.
	async fn soft_delete(&self, kind: EntityKind, external_id: &str) -> Result<bool, CacheError>;
}

/// Merge an incoming sighting into the stored entry, keeping its creation time.
fn merge(stored: &mut CacheEntry, incoming: CacheEntry) -> UpsertOutcome {
	let outcome = if stored.content_hash == incoming.content_hash && !stored.is_deleted() {
		UpsertOutcome::Unchanged
	} else {
		UpsertOutcome::Updated
	};

	stored.provider = incoming.provider;
	stored.snapshot = incoming.snapshot;
	stored.content_hash = incoming.content_hash;
	stored.updated_at = incoming.updated_at;
	stored.deleted_at = None;
	outcome
}

fn live_sorted<'a>(entries: impl Iterator<Item = &'a CacheEntry>) -> Vec<CacheEntry> {
	let mut live: Vec<CacheEntry> = entries.filter(|e| !e.is_deleted()).cloned().collect();
	live.sort_by(|a, b| a.external_id.cmp(&b.external_id));
	live
}

/// In-memory implementation of RecordCache
#[derive(Default)]
pub struct InMemoryRecordCache {
	entries: RwLock<HashMap<(EntityKind, String), CacheEntry>>,
}

impl InMemoryRecordCache {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl RecordCache for InMemoryRecordCache {
	async fn find_by_external_id(
		&self,
		kind: EntityKind,
		external_id: &str,
	) -> Result<Option<CacheEntry>, CacheError> {
		let entries = self.entries.read().await;
		Ok(entries.get(&(kind, external_id.to_string())).cloned())
	}

	async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, CacheError> {
		let mut entries = self.entries.write().await;
		let key = (entry.kind, entry.external_id.clone());
		match entries.get_mut(&key) {
			Some(stored) => Ok(merge(stored, entry)),
			None => {
				entries.insert(key, entry);
				Ok(UpsertOutcome::Created)
			}
		}
	}

	async fn list(&self, kind: EntityKind) -> Result<Vec<CacheEntry>, CacheError> {
		let entries = self.entries.read().await;
		Ok(live_sorted(entries.values().filter(|e| e.kind == kind)))
	}

	async fn soft_delete(&self, kind: EntityKind, external_id: &str) -> Result<bool, CacheError> {
		let mut entries = self.entries.write().await;
		match entries.get_mut(&(kind, external_id.to_string())) {
			Some(stored) => {
				stored.deleted_at = Some(chrono::Utc::now());
				Ok(true)
			}
			None => Ok(false),
		}
	}
}

/// File-based implementation of RecordCache
///
/// Each entity kind lives in its own JSON file (`cache_<kind>s.json`) under the data directory.
/// Writes go through a temporary file and a rename so a crash never leaves a torn file behind.
pub struct FileRecordCache {
	data_dir: PathBuf,
	/// Serializes read-modify-write cycles.
	lock: Mutex<()>,
}

impl FileRecordCache {
	pub fn new(data_dir: PathBuf) -> Self {
		Self {
			data_dir,
			lock: Mutex::new(()),
		}
	}

	fn get_cache_filename(&self, kind: EntityKind) -> PathBuf {
		self.data_dir.join(format!("cache_{}s.json", kind.as_str()))
	}

	async fn load(&self, path: &Path) -> Result<Vec<CacheEntry>, CacheError> {
		if !tokio::fs::try_exists(path).await? {
			return Ok(Vec::new());
		}
		let content = tokio::fs::read_to_string(path).await?;
		if content.trim().is_empty() {
			return Ok(Vec::new());
		}
		Ok(serde_json::from_str(&content)?)
	}

	async fn store(&self, path: &Path, entries: &mut [CacheEntry]) -> Result<(), CacheError> {
		entries.sort_by(|a, b| a.external_id.cmp(&b.external_id));
		tokio::fs::create_dir_all(&self.data_dir).await?;

		let content = serde_json::to_string_pretty(entries)?;
		let tmp = path.with_extension("json.tmp");
		tokio::fs::write(&tmp, content).await?;
		tokio::fs::rename(&tmp, path).await?;

		debug!("Wrote {} cache entries to {:?}", entries.len(), path);
		Ok(())
	}
}

#[async_trait::async_trait]
impl RecordCache for FileRecordCache {
	async fn find_by_external_id(
		&self,
		kind: EntityKind,
		external_id: &str,
	) -> Result<Option<CacheEntry>, CacheError> {
		let _guard = self.lock.lock().await;
		let entries = self.load(&self.get_cache_filename(kind)).await?;
		Ok(entries.into_iter().find(|e| e.external_id == external_id))
	}

	async fn upsert(&self, entry: CacheEntry) -> Result<UpsertOutcome, CacheError> {
		let _guard = self.lock.lock().await;
		let path = self.get_cache_filename(entry.kind);
		let mut entries = self.load(&path).await?;

		let outcome = match entries
			.iter_mut()
			.find(|e| e.external_id == entry.external_id)
		{
			Some(stored) => merge(stored, entry),
			None => {
				info!("Caching new {} {}", entry.kind, entry.external_id);
				entries.push(entry);
				UpsertOutcome::Created
			}
		};

		self.store(&path, &mut entries).await?;
		Ok(outcome)
	}

	async fn list(&self, kind: EntityKind) -> Result<Vec<CacheEntry>, CacheError> {
		let _guard = self.lock.lock().await;
		let entries = self.load(&self.get_cache_filename(kind)).await?;
		Ok(live_sorted(entries.iter()))
	}

	async fn soft_delete(&self, kind: EntityKind, external_id: &str) -> Result<bool, CacheError> {
		let _guard = self.lock.lock().await;
		let path = self.get_cache_filename(kind);
		let mut entries = self.load(&path).await?;

		let Some(stored) = entries.iter_mut().find(|e| e.external_id == external_id) else {
			return Ok(false);
		};
		stored.deleted_at = Some(chrono::Utc::now());
		self.store(&path, &mut entries).await?;
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::aggregator::{AggregatorAccount, Login};
	use serde_json::json;

	fn account(balance: f64) -> AggregatorAccount {
		serde_json::from_value(json!({
			"id": "42",
			"login_id": "7",
			"name": "GB98MIDL07009312345678",
			"nature": "account",
			"balance": balance,
			"currency_code": "GBP"
		}))
		.unwrap()
	}

	async fn upsert_twice_keeps_one_entry(cache: &dyn RecordCache) {
		let first = CacheEntry::of("saltedge", &account(10.0)).unwrap();
		let second = CacheEntry::of("saltedge", &account(20.0)).unwrap();
		let second_hash = second.content_hash.clone();
		let second_snapshot = second.snapshot.clone();

		assert_eq!(cache.upsert(first.clone()).await.unwrap(), UpsertOutcome::Created);
		assert_eq!(cache.upsert(second).await.unwrap(), UpsertOutcome::Updated);

		let entries = cache.list(EntityKind::Account).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].content_hash, second_hash);
		assert_eq!(entries[0].snapshot, second_snapshot);
		assert_eq!(entries[0].created_at, first.created_at);
	}

	#[tokio::test]
	async fn in_memory_upsert_replaces_changed_content() {
		upsert_twice_keeps_one_entry(&InMemoryRecordCache::new()).await;
	}

	#[tokio::test]
	async fn file_upsert_replaces_changed_content() {
		let dir = tempfile::tempdir().unwrap();
		upsert_twice_keeps_one_entry(&FileRecordCache::new(dir.path().to_path_buf())).await;
	}

	#[tokio::test]
	async fn identical_sighting_is_unchanged() {
		let cache = InMemoryRecordCache::new();
		cache.upsert(CacheEntry::of("saltedge", &account(1.0)).unwrap()).await.unwrap();
		let outcome = cache
			.upsert(CacheEntry::of("saltedge", &account(1.0)).unwrap())
			.await
			.unwrap();
		assert_eq!(outcome, UpsertOutcome::Unchanged);
	}

	#[tokio::test]
	async fn kinds_do_not_collide() {
		let cache = InMemoryRecordCache::new();
		let login: Login = serde_json::from_value(json!({ "id": "42" })).unwrap();
		cache.upsert(CacheEntry::of("saltedge", &login).unwrap()).await.unwrap();
		cache.upsert(CacheEntry::of("saltedge", &account(1.0)).unwrap()).await.unwrap();

		assert_eq!(cache.list(EntityKind::Login).await.unwrap().len(), 1);
		assert_eq!(cache.list(EntityKind::Account).await.unwrap().len(), 1);
		let found = cache.find_by_external_id(EntityKind::Login, "42").await.unwrap();
		assert_eq!(found.map(|e| e.kind), Some(EntityKind::Login));
	}

	#[tokio::test]
	async fn soft_deleted_entries_are_hidden_and_revived_on_sighting() {
		let dir = tempfile::tempdir().unwrap();
		let cache = FileRecordCache::new(dir.path().to_path_buf());
		cache.upsert(CacheEntry::of("saltedge", &account(1.0)).unwrap()).await.unwrap();

		assert!(cache.soft_delete(EntityKind::Account, "42").await.unwrap());
		assert!(!cache.soft_delete(EntityKind::Account, "missing").await.unwrap());
		assert!(cache.list(EntityKind::Account).await.unwrap().is_empty());
		assert!(cache
			.find_by_external_id(EntityKind::Account, "42")
			.await
			.unwrap()
			.is_some_and(|e| e.is_deleted()));

		let outcome = cache
			.upsert(CacheEntry::of("saltedge", &account(1.0)).unwrap())
			.await
			.unwrap();
		assert_eq!(outcome, UpsertOutcome::Updated);
		assert_eq!(cache.list(EntityKind::Account).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn file_cache_survives_reopening() {
		let dir = tempfile::tempdir().unwrap();
		FileRecordCache::new(dir.path().to_path_buf())
			.upsert(CacheEntry::of("saltedge", &account(5.0)).unwrap())
			.await
			.unwrap();

		let reopened = FileRecordCache::new(dir.path().to_path_buf());
		let entry = reopened
			.find_by_external_id(EntityKind::Account, "42")
			.await
			.unwrap()
			.unwrap();
		let decoded: AggregatorAccount = entry.decode().unwrap();
		assert_eq!(decoded, account(5.0));
	}
}
