//! Fetchers for aggregator entities.
//!
//! Each fetcher pages through a Salt Edge list endpoint, decodes every item on its own (a
//! malformed item is skipped, never the whole batch) and records logins and accounts in the
//! record cache.

use super::types::{AggregatorAccount, AggregatorTransaction, Login};
use crate::cache::{CacheEntry, Cacheable, RecordCache};
use crate::provider::ProviderClient;
use crate::sync::progress_tracker::SyncProgressTracker;
use crate::sync::types::SyncError;
use crate::utils::{decode_items, with_query};

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 1000;

/// Drives the aggregator list endpoints.
pub struct AggregatorFetcher {
	client: Arc<dyn ProviderClient>,
	cache: Arc<dyn RecordCache>,
}

impl AggregatorFetcher {
	pub fn new(client: Arc<dyn ProviderClient>, cache: Arc<dyn RecordCache>) -> Self {
		Self { client, cache }
	}

	/// Fetch all logins, optionally restricted to one customer, and cache them.
	pub async fn fetch_logins(
		&self,
		customer_id: Option<&str>,
		progress: &mut SyncProgressTracker,
	) -> Result<Vec<Login>, SyncError> {
		let path = match customer_id {
			Some(id) => with_query("logins", "customer_id", id),
			None => "logins".to_string(),
		};
		let items = self.fetch_pages(&path, "logins").await?;
		progress.record_fetched(items.len());

		let logins = decode_items(items, "login", Login::validate, progress);
		self.cache_records(&logins, progress).await;
		info!("Fetched {} logins", logins.len());
		Ok(logins)
	}

	/// Fetch the accounts of one login and cache them.
	pub async fn fetch_accounts(
		&self,
		login_id: &str,
		progress: &mut SyncProgressTracker,
	) -> Result<Vec<AggregatorAccount>, SyncError> {
		let path = with_query("accounts", "login_id", login_id);
		let what = format!("accounts of login {}", login_id);
		let items = self.fetch_pages(&path, &what).await?;
		progress.record_fetched(items.len());

		let accounts = decode_items(items, "account", AggregatorAccount::validate, progress);
		self.cache_records(&accounts, progress).await;
		info!("Fetched {} accounts for login {}", accounts.len(), login_id);
		Ok(accounts)
	}

	/// Fetch the posted transactions of one account.
	///
	/// Pending transactions and those the aggregator flags as duplicates are left out; they are
	/// picked up on a later pass once posted.
	pub async fn fetch_transactions(
		&self,
		account: &AggregatorAccount,
		progress: &mut SyncProgressTracker,
	) -> Result<Vec<AggregatorTransaction>, SyncError> {
		let path = with_query(
			&with_query("transactions", "login_id", &account.login_id),
			"account_id",
			&account.id,
		);
		let what = format!("transactions of account {}", account.id);
		let items = self.fetch_pages(&path, &what).await?;
		progress.record_fetched(items.len());

		let transactions: Vec<AggregatorTransaction> =
			decode_items(items, "transaction", AggregatorTransaction::validate, progress)
				.into_iter()
				.filter(|tx| {
					if tx.is_pending() || tx.duplicated {
						debug!("Leaving transaction {} for a later pass (pending or duplicate)", tx.id);
						progress.record_skipped();
						return false;
					}
					true
				})
				.collect();

		info!(
			"Fetched {} transactions for account {}",
			transactions.len(),
			account.id
		);
		Ok(transactions)
	}

	/// Decode every live cache entry of type `T`, skipping entries that no longer decode.
	pub async fn load_cached<T: Cacheable>(
		&self,
		progress: &mut SyncProgressTracker,
	) -> Result<Vec<T>, SyncError> {
		let entries = self.cache.list(T::KIND).await?;
		let mut records = Vec::with_capacity(entries.len());
		for entry in entries {
			match entry.decode::<T>() {
				Ok(record) => records.push(record),
				Err(e) => {
					warn!(
						"Skipping cached {} {} that no longer decodes: {}",
						entry.kind, entry.external_id, e
					);
					progress.record_failed();
				}
			}
		}
		Ok(records)
	}

	async fn cache_records<T: Cacheable>(&self, records: &[T], progress: &mut SyncProgressTracker) {
		for record in records {
			let outcome = match CacheEntry::of(self.client.name(), record) {
				Ok(entry) => self.cache.upsert(entry).await,
				Err(e) => Err(e),
			};
			match outcome {
				Ok(outcome) => progress.record_cached(outcome),
				Err(e) => {
					warn!(
						"Could not cache {} {}: {}",
						T::KIND,
						record.external_id(),
						e
					);
					progress.record_failed();
				}
			}
		}
	}

	/// Follow `meta.next_id` until the listing is exhausted.
	async fn fetch_pages(&self, path: &str, what: &str) -> Result<Vec<Value>, SyncError> {
		let mut items = Vec::new();
		let mut seen = HashSet::new();
		let mut next_path = path.to_string();

		for _ in 0..MAX_PAGES {
			let response = self
				.client
				.get(&next_path)
				.await
				.ok_or_else(|| SyncError::fetch(what, "provider did not answer"))?;

			let Some(page) = response.data().and_then(Value::as_array) else {
				return Err(SyncError::fetch(what, "the data structure returned is unrecognized"));
			};
			items.extend(page.iter().cloned());

			let next_id = response
				.meta()
				.and_then(|meta| meta.get("next_id"))
				.and_then(|id| match id {
					Value::String(s) if !s.is_empty() => Some(s.clone()),
					Value::Number(n) => Some(n.to_string()),
					_ => None,
				});

			match next_id {
				Some(id) if seen.insert(id.clone()) => next_path = with_query(path, "from_id", &id),
				Some(id) => {
					warn!("Listing {} repeated page cursor {}, stopping", what, id);
					return Ok(items);
				}
				None => return Ok(items),
			}
		}

		warn!("Listing {} exceeded {} pages, stopping", what, MAX_PAGES);
		Ok(items)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::{EntityKind, InMemoryRecordCache};
	use crate::provider::ProviderResponse;
	use crate::sync::types::Stage;
	use serde_json::json;
	use std::collections::HashMap;

	/// Serves canned GET responses keyed by path.
	#[derive(Default)]
	struct StubClient {
		responses: HashMap<String, Value>,
	}

	impl StubClient {
		fn with(mut self, path: &str, body: Value) -> Self {
			self.responses.insert(path.to_string(), body);
			self
		}
	}

	#[async_trait::async_trait]
	impl ProviderClient for StubClient {
		async fn get(&self, path: &str) -> Option<ProviderResponse> {
			self.responses.get(path).map(|body| ProviderResponse {
				status: 200,
				body: body.clone(),
			})
		}

		async fn post(&self, _path: &str, _payload: &Value) -> Option<ProviderResponse> {
			None
		}

		fn name(&self) -> &str {
			"saltedge"
		}
	}

	fn account_json(id: &str) -> Value {
		json!({
			"id": id,
			"login_id": "7",
			"name": format!("IBAN-{}", id),
			"nature": "account",
			"balance": 10.5,
			"currency_code": "EUR"
		})
	}

	fn fetcher(client: StubClient) -> (AggregatorFetcher, Arc<InMemoryRecordCache>) {
		let cache = Arc::new(InMemoryRecordCache::new());
		(AggregatorFetcher::new(Arc::new(client), cache.clone()), cache)
	}

	fn tracker() -> SyncProgressTracker {
		let mut tracker = SyncProgressTracker::new();
		tracker.begin_stage(Stage::FetchAggregatorAccounts);
		tracker
	}

	#[tokio::test]
	async fn follows_next_id_and_caches_accounts() {
		let client = StubClient::default()
			.with(
				"accounts?login_id=7",
				json!({ "data": [account_json("1")], "meta": { "next_id": "2" } }),
			)
			.with(
				"accounts?login_id=7&from_id=2",
				json!({ "data": [account_json("2")], "meta": { "next_id": null } }),
			);
		let (fetcher, cache) = fetcher(client);
		let mut progress = tracker();

		let accounts = fetcher.fetch_accounts("7", &mut progress).await.unwrap();

		assert_eq!(accounts.len(), 2);
		assert_eq!(cache.list(EntityKind::Account).await.unwrap().len(), 2);
		let counters = progress.finish_stage();
		assert_eq!(counters.fetched, 2);
		assert_eq!(counters.cached_new, 2);
	}

	#[tokio::test]
	async fn malformed_items_do_not_abort_the_batch() {
		let client = StubClient::default().with(
			"accounts?login_id=7",
			json!({ "data": [account_json("1"), { "id": "2", "nature": "account" }] }),
		);
		let (fetcher, _) = fetcher(client);
		let mut progress = tracker();

		let accounts = fetcher.fetch_accounts("7", &mut progress).await.unwrap();

		assert_eq!(accounts.len(), 1);
		assert_eq!(progress.finish_stage().failed, 1);
	}

	#[tokio::test]
	async fn unrecognized_payload_is_a_fetch_failure() {
		let client = StubClient::default().with("logins", json!({ "error": "nope" }));
		let (fetcher, _) = fetcher(client);

		let result = fetcher.fetch_logins(None, &mut tracker()).await;
		assert!(matches!(result, Err(SyncError::FetchFailure { .. })));
	}

	#[tokio::test]
	async fn missing_response_is_a_fetch_failure() {
		let (fetcher, _) = fetcher(StubClient::default());
		let result = fetcher.fetch_logins(Some("42"), &mut tracker()).await;
		assert!(matches!(result, Err(SyncError::FetchFailure { .. })));
	}

	#[tokio::test]
	async fn pending_and_duplicated_transactions_are_left_out() {
		let account: AggregatorAccount = serde_json::from_value(account_json("1")).unwrap();
		let client = StubClient::default().with(
			"transactions?login_id=7&account_id=1",
			json!({ "data": [
				{ "id": "t1", "account_id": "1", "description": "Coffee", "amount": -3.5,
				  "currency_code": "EUR", "made_on": "2020-06-01", "status": "posted" },
				{ "id": "t2", "account_id": "1", "description": "Coffee", "amount": -3.5,
				  "currency_code": "EUR", "made_on": "2020-06-02", "status": "pending" },
				{ "id": "t3", "account_id": "1", "description": "Coffee", "amount": -3.5,
				  "currency_code": "EUR", "made_on": "2020-06-03", "duplicated": true }
			] }),
		);
		let (fetcher, _) = fetcher(client);
		let mut progress = tracker();

		let transactions = fetcher.fetch_transactions(&account, &mut progress).await.unwrap();

		assert_eq!(transactions.len(), 1);
		assert_eq!(transactions[0].id, "t1");
		assert_eq!(progress.finish_stage().skipped, 2);
	}

	#[tokio::test]
	async fn repeated_cursor_stops_paging() {
		let client = StubClient::default()
			.with("logins", json!({ "data": [{ "id": "1" }], "meta": { "next_id": "1" } }))
			.with(
				"logins?from_id=1",
				json!({ "data": [{ "id": "2" }], "meta": { "next_id": "1" } }),
			);
		let (fetcher, _) = fetcher(client);

		let logins = fetcher.fetch_logins(None, &mut tracker()).await.unwrap();
		assert_eq!(logins.len(), 2);
	}
}
