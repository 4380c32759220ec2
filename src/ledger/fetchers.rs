//! Fetchers for ledger snapshots.

use super::types::{
	AccountAttributes, LedgerAccount, LedgerTransaction, Resource, TransactionAttributes, total_pages,
};
use crate::provider::ProviderClient;
use crate::sync::progress_tracker::SyncProgressTracker;
use crate::sync::types::SyncError;
use crate::utils::{decode_items, with_query};

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Upper bound on pages followed for one listing.
const MAX_PAGES: u64 = 1000;

/// Reads accounts and transaction references from the ledger.
pub struct LedgerFetcher {
	client: Arc<dyn ProviderClient>,
}

impl LedgerFetcher {
	pub fn new(client: Arc<dyn ProviderClient>) -> Self {
		Self { client }
	}

	/// Every account the ledger knows, of all types.
	pub async fn fetch_accounts(
		&self,
		progress: &mut SyncProgressTracker,
	) -> Result<Vec<LedgerAccount>, SyncError> {
		let items = self.fetch_pages("accounts", "ledger accounts").await?;
		let total = items.len();
		progress.record_fetched(total);

		let accounts: Vec<LedgerAccount> =
			decode_items::<Resource<AccountAttributes>>(items, "ledger account", |_| Ok(()), progress)
				.into_iter()
				.map(LedgerAccount::from)
				.collect();
		ensure_complete("ledger accounts", accounts.len(), total)?;
		info!("Fetched {} ledger accounts", accounts.len());
		Ok(accounts)
	}

	/// Every ledger transaction.
	pub async fn fetch_transactions(
		&self,
		progress: &mut SyncProgressTracker,
	) -> Result<Vec<LedgerTransaction>, SyncError> {
		let items = self.fetch_pages("transactions", "ledger transactions").await?;
		let total = items.len();
		progress.record_fetched(total);

		let transactions: Vec<LedgerTransaction> = decode_items::<Resource<TransactionAttributes>>(
			items,
			"ledger transaction",
			|_| Ok(()),
			progress,
		)
		.into_iter()
		.map(LedgerTransaction::from)
		.collect();
		ensure_complete("ledger transactions", transactions.len(), total)?;
		info!("Fetched {} ledger transactions", transactions.len());
		Ok(transactions)
	}

	/// The aggregator references already present in the ledger.
	pub async fn fetch_transaction_refs(
		&self,
		progress: &mut SyncProgressTracker,
	) -> Result<HashSet<String>, SyncError> {
		let transactions = self.fetch_transactions(progress).await?;
		Ok(transactions
			.iter()
			.flat_map(|tx| tx.external_ids())
			.map(str::to_string)
			.collect())
	}

	/// Walk `page=1..=total_pages`.
	async fn fetch_pages(&self, path: &str, what: &str) -> Result<Vec<Value>, SyncError> {
		let mut items = Vec::new();
		let mut page = 1;

		loop {
			let response = self
				.client
				.get(&with_query(path, "page", &page.to_string()))
				.await
				.ok_or_else(|| SyncError::fetch(what, "provider did not answer"))?;

			let Some(data) = response.data().and_then(Value::as_array) else {
				return Err(SyncError::fetch(what, "the data structure returned is unrecognized"));
			};
			items.extend(data.iter().cloned());

			let last_page = total_pages(response.meta()).unwrap_or(1);
			if page >= last_page || data.is_empty() {
				return Ok(items);
			}
			if page >= MAX_PAGES {
				warn!("Listing {} exceeded {} pages, stopping", what, MAX_PAGES);
				return Ok(items);
			}
			page += 1;
		}
	}
}

/// Fails the listing when any record was dropped while decoding.
fn ensure_complete(what: &str, decoded: usize, total: usize) -> Result<(), SyncError> {
	if decoded < total {
		return Err(SyncError::fetch(
			what,
			format!("{} of {} records could not be decoded", total - decoded, total),
		));
	}
	Ok(())
}
