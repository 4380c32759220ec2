//! Ledger writer.
//!
//! Turns aggregator records into Firefly creation payloads and performs the creation calls.
//! Every create is a single POST; a rejected create is reported as `CreationFailure` and left for
//! the next pass.

use super::types::{
	AccountAttributes, AccountRole, LedgerAccount, LedgerAccountType, LedgerTransaction,
	NewLedgerAccount, NewLedgerSplit, NewLedgerTransaction, Resource, TransactionAttributes,
	TransactionKind,
};
use crate::aggregator::{AggregatorAccount, AggregatorTransaction};
use crate::config::LiabilitySettings;
use crate::provider::ProviderClient;
use crate::sync::types::SyncError;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Name used for a counter-account when the transaction has no description.
const UNNAMED_COUNTER_PARTY: &str = "(unknown counter-party)";

/// Creates accounts and transactions in the ledger.
pub struct LedgerWriter {
	client: Arc<dyn ProviderClient>,
	liability: LiabilitySettings,
}

impl LedgerWriter {
	pub fn new(client: Arc<dyn ProviderClient>, liability: LiabilitySettings) -> Self {
		Self { client, liability }
	}

	/// Build the creation payload for an aggregator account.
	///
	/// Loans and mortgages become liabilities keyed by account number; everything else becomes an
	/// asset keyed by IBAN. `today` is used as the opening balance date.
	pub fn account_payload(&self, account: &AggregatorAccount, today: NaiveDate) -> NewLedgerAccount {
		if account.nature.is_liability() {
			NewLedgerAccount {
				account_number: Some(account.identifier().to_string()),
				currency_code: Some(account.currency_code.clone()),
				liability_type: Some(self.liability.liability_type.clone()),
				liability_amount: Some(account.balance.abs()),
				liability_start_date: Some(self.liability.start_date),
				interest: account
					.extra
					.max_interest_rate()
					.map(|rate| rate.normalize().to_string()),
				interest_period: Some(self.liability.interest_period.clone()),
				..NewLedgerAccount::named(account.display_name(), LedgerAccountType::Liability)
			}
		} else {
			let role = if account.nature.is_checking_like() {
				AccountRole::DefaultAsset
			} else {
				AccountRole::SavingAsset
			};
			NewLedgerAccount {
				iban: Some(account.identifier().to_string()),
				account_role: Some(role),
				opening_balance: Some(account.balance),
				opening_balance_date: Some(today),
				currency_code: Some(account.currency_code.clone()),
				..NewLedgerAccount::named(account.display_name(), LedgerAccountType::Asset)
			}
		}
	}

	/// Create the ledger counterpart of an aggregator account.
	pub async fn create_account(&self, account: &AggregatorAccount) -> Result<LedgerAccount, SyncError> {
		let payload = self.account_payload(account, Utc::now().date_naive());
		let what = format!("{} account {}", payload.account_type, account.identifier());
		let created = self.create_ledger_account(&payload, &what).await?;
		info!(
			"Created ledger {} for aggregator account {} as {}",
			what, account.id, created.ledger_id
		);
		Ok(created)
	}

	/// Revenue for money coming in, expense otherwise.
	pub fn counter_account_type(amount: Decimal) -> LedgerAccountType {
		if amount > Decimal::ZERO {
			LedgerAccountType::Revenue
		} else {
			LedgerAccountType::Expense
		}
	}

	/// Name under which the counter-party of a transaction is kept.
	pub fn counter_account_name(transaction: &AggregatorTransaction) -> &str {
		let description = transaction.description.trim();
		if description.is_empty() {
			UNNAMED_COUNTER_PARTY
		} else {
			description
		}
	}

	pub fn counter_account_payload(&self, transaction: &AggregatorTransaction) -> NewLedgerAccount {
		NewLedgerAccount {
			currency_code: Some(transaction.currency_code.clone()),
			..NewLedgerAccount::named(
				Self::counter_account_name(transaction),
				Self::counter_account_type(transaction.amount),
			)
		}
	}

	/// Create the expense or revenue account for a transaction's counter-party.
	pub async fn create_counter_account(
		&self,
		transaction: &AggregatorTransaction,
	) -> Result<LedgerAccount, SyncError> {
		let payload = self.counter_account_payload(transaction);
		let what = format!("{} account '{}'", payload.account_type, payload.name);
		let created = self.create_ledger_account(&payload, &what).await?;
		info!("Created ledger {} as {}", what, created.ledger_id);
		Ok(created)
	}

	/// Build a transaction group moving money between `asset` and `counter`.
	pub fn transaction_payload(
		&self,
		transaction: &AggregatorTransaction,
		asset: &LedgerAccount,
		counter: &LedgerAccount,
	) -> NewLedgerTransaction {
		let (kind, source_id, destination_id) = if transaction.amount > Decimal::ZERO {
			(TransactionKind::Deposit, &counter.ledger_id, &asset.ledger_id)
		} else {
			(TransactionKind::Withdrawal, &asset.ledger_id, &counter.ledger_id)
		};

		NewLedgerTransaction {
			error_if_duplicate_hash: true,
			apply_rules: true,
			transactions: vec![NewLedgerSplit {
				kind,
				date: transaction.made_on,
				amount: transaction.amount.abs(),
				description: Self::counter_account_name(transaction).to_string(),
				source_id: source_id.clone(),
				destination_id: destination_id.clone(),
				currency_code: transaction.currency_code.clone(),
				external_id: transaction.id.clone(),
			}],
		}
	}

	pub async fn create_transaction(
		&self,
		transaction: &AggregatorTransaction,
		asset: &LedgerAccount,
		counter: &LedgerAccount,
	) -> Result<LedgerTransaction, SyncError> {
		let payload = self.transaction_payload(transaction, asset, counter);
		let what = format!("transaction {}", transaction.id);
		let resource: Resource<TransactionAttributes> = self.post("transactions", &payload, &what).await?;
		debug!("Created ledger {} as {}", what, resource.id);
		Ok(LedgerTransaction::from(resource))
	}

	async fn create_ledger_account(
		&self,
		payload: &NewLedgerAccount,
		what: &str,
	) -> Result<LedgerAccount, SyncError> {
		let resource: Resource<AccountAttributes> = self.post("accounts", payload, what).await?;
		Ok(LedgerAccount::from(resource))
	}

	/// POST once and decode the created resource from `data`.
	async fn post<P: Serialize, R: DeserializeOwned>(
		&self,
		path: &str,
		payload: &P,
		what: &str,
	) -> Result<R, SyncError> {
		let body = serde_json::to_value(payload).map_err(|e| SyncError::creation(what, e.to_string()))?;
		let response = self
			.client
			.post(path, &body)
			.await
			.ok_or_else(|| SyncError::creation(what, "ledger did not accept the request"))?;

		let data = response
			.data()
			.cloned()
			.ok_or_else(|| SyncError::creation(what, "response carried no data"))?;
		serde_json::from_value(data).map_err(|e| SyncError::creation(what, e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::provider::ProviderResponse;
	use rust_decimal_macros::dec;
	use serde_json::{Value, json};
	use std::sync::Mutex;

	/// Records POSTs and answers with a fixed body.
	struct RecordingClient {
		reply: Option<Value>,
		posted: Mutex<Vec<(String, Value)>>,
	}

	impl RecordingClient {
		fn replying(reply: Option<Value>) -> Self {
			Self {
				reply,
				posted: Mutex::new(Vec::new()),
			}
		}
	}

	#[async_trait::async_trait]
	impl ProviderClient for RecordingClient {
		async fn get(&self, _path: &str) -> Option<ProviderResponse> {
			None
		}

		async fn post(&self, path: &str, payload: &Value) -> Option<ProviderResponse> {
			self.posted.lock().unwrap().push((path.to_string(), payload.clone()));
			self.reply.clone().map(|body| ProviderResponse { status: 200, body })
		}

		fn name(&self) -> &str {
			"firefly"
		}
	}

	fn writer(client: Arc<RecordingClient>) -> LedgerWriter {
		LedgerWriter::new(client, LiabilitySettings::default())
	}

	fn aggregator_account(value: Value) -> AggregatorAccount {
		serde_json::from_value(value).unwrap()
	}

	fn transaction(amount: f64, description: &str) -> AggregatorTransaction {
		serde_json::from_value(json!({
			"id": "t1",
			"account_id": "1",
			"description": description,
			"amount": amount,
			"currency_code": "EUR",
			"made_on": "2020-06-01"
		}))
		.unwrap()
	}

	fn ledger_account(id: &str, account_type: LedgerAccountType) -> LedgerAccount {
		LedgerAccount {
			ledger_id: id.to_string(),
			name: id.to_string(),
			account_type,
			iban: None,
			account_number: None,
			role: None,
			currency_code: None,
			opening_balance: None,
			liability: None,
		}
	}

	fn today() -> NaiveDate {
		NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
	}

	#[test]
	fn checking_accounts_become_default_assets() {
		let account = aggregator_account(json!({
			"id": "1", "login_id": "7", "name": "GB98MIDL07009312345678",
			"nature": "account", "balance": -1012.12, "currency_code": "GBP"
		}));
		let payload = writer(Arc::new(RecordingClient::replying(None))).account_payload(&account, today());

		assert_eq!(
			serde_json::to_value(&payload).unwrap(),
			json!({
				"name": "GB98MIDL07009312345678",
				"type": "asset",
				"iban": "GB98MIDL07009312345678",
				"account_role": "defaultAsset",
				"opening_balance": -1012.12,
				"opening_balance_date": "2024-03-01",
				"currency_code": "GBP"
			})
		);
	}

	#[test]
	fn other_natures_become_savings() {
		let account = aggregator_account(json!({
			"id": "1", "login_id": "7", "name": "NL01SAVE", "nature": "savings",
			"balance": 10, "currency_code": "EUR", "extra": { "account_name": "Spaarrekening" }
		}));
		let payload = writer(Arc::new(RecordingClient::replying(None))).account_payload(&account, today());
		assert_eq!(payload.account_role, Some(AccountRole::SavingAsset));
		assert_eq!(payload.name, "Spaarrekening");
	}

	#[test]
	fn mortgages_become_liabilities_with_highest_rate() {
		let account = aggregator_account(json!({
			"id": "11", "login_id": "7", "name": "NL-MORTGAGE-001", "nature": "mortgage",
			"balance": -250000.5, "currency_code": "EUR",
			"extra": { "interest_rates": [2.1, 5.3, 3.0] }
		}));
		let payload = writer(Arc::new(RecordingClient::replying(None))).account_payload(&account, today());

		assert_eq!(payload.account_type, LedgerAccountType::Liability);
		assert_eq!(payload.account_number.as_deref(), Some("NL-MORTGAGE-001"));
		assert_eq!(payload.iban, None);
		assert_eq!(payload.liability_type.as_deref(), Some("mortgage"));
		assert_eq!(payload.liability_amount, Some(dec!(250000.5)));
		assert_eq!(payload.liability_start_date, NaiveDate::from_ymd_opt(2020, 1, 1));
		assert_eq!(payload.interest.as_deref(), Some("5.3"));
		assert_eq!(payload.interest_period.as_deref(), Some("monthly"));
	}

	#[test]
	fn counter_account_type_follows_the_sign() {
		assert_eq!(LedgerWriter::counter_account_type(dec!(12.5)), LedgerAccountType::Revenue);
		assert_eq!(LedgerWriter::counter_account_type(dec!(-3)), LedgerAccountType::Expense);
		assert_eq!(LedgerWriter::counter_account_type(Decimal::ZERO), LedgerAccountType::Expense);
	}

	#[test]
	fn withdrawals_flow_from_the_asset_account() {
		let w = writer(Arc::new(RecordingClient::replying(None)));
		let asset = ledger_account("1", LedgerAccountType::Asset);
		let expense = ledger_account("2", LedgerAccountType::Expense);

		let payload = w.transaction_payload(&transaction(-23.45, " Albert Heijn "), &asset, &expense);
		let split = &payload.transactions[0];

		assert!(payload.error_if_duplicate_hash);
		assert_eq!(split.kind, TransactionKind::Withdrawal);
		assert_eq!(split.amount, dec!(23.45));
		assert_eq!((split.source_id.as_str(), split.destination_id.as_str()), ("1", "2"));
		assert_eq!(split.description, "Albert Heijn");
		assert_eq!(split.external_id, "t1");
	}

	#[test]
	fn deposits_flow_into_the_asset_account() {
		let w = writer(Arc::new(RecordingClient::replying(None)));
		let asset = ledger_account("1", LedgerAccountType::Asset);
		let revenue = ledger_account("3", LedgerAccountType::Revenue);

		let payload = w.transaction_payload(&transaction(1500.0, "Salary"), &asset, &revenue);
		let split = &payload.transactions[0];
		assert_eq!(split.kind, TransactionKind::Deposit);
		assert_eq!((split.source_id.as_str(), split.destination_id.as_str()), ("3", "1"));
		assert_eq!(
			serde_json::to_value(split).unwrap()["amount"],
			json!("1500")
		);
	}

	#[tokio::test]
	async fn creates_counter_account_once() {
		let client = Arc::new(RecordingClient::replying(Some(json!({
			"data": { "id": "40", "attributes": { "name": "Albert Heijn", "type": "expense" } }
		}))));
		let created = writer(client.clone())
			.create_counter_account(&transaction(-3.0, "Albert Heijn"))
			.await
			.unwrap();

		assert_eq!(created.ledger_id, "40");
		assert_eq!(created.account_type, LedgerAccountType::Expense);
		let posted = client.posted.lock().unwrap();
		assert_eq!(posted.len(), 1);
		assert_eq!(posted[0].0, "accounts");
		assert_eq!(posted[0].1["type"], json!("expense"));
	}

	#[tokio::test]
	async fn rejected_create_is_a_creation_failure() {
		let client = Arc::new(RecordingClient::replying(None));
		let account = aggregator_account(json!({
			"id": "1", "login_id": "7", "name": "NL01", "nature": "checking",
			"balance": 1, "currency_code": "EUR"
		}));

		let result = writer(client.clone()).create_account(&account).await;
		assert!(matches!(result, Err(SyncError::CreationFailure { .. })));
		assert_eq!(client.posted.lock().unwrap().len(), 1);
	}
}
