//! Identity resolution between aggregator records and the ledger snapshot.

use super::snapshot::LedgerSnapshot;
use super::strategies::{MatchStrategy, default_strategies};
use super::types::SyncError;
use crate::aggregator::{AggregatorAccount, AggregatorTransaction};
use crate::ledger::{LedgerAccount, LedgerAccountType};
use crate::utils::normalize_identifier;

use std::collections::HashSet;
use tracing::debug;

/// Outcome of looking up one aggregator record in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
	Matched {
		account: LedgerAccount,
		/// Name of the strategy that found it.
		strategy: &'static str,
	},
	NotFound,
}

impl MatchResult {
	pub fn account(&self) -> Option<&LedgerAccount> {
		match self {
			MatchResult::Matched { account, .. } => Some(account),
			MatchResult::NotFound => None,
		}
	}
}

/// Matches aggregator records against one ledger snapshot.
pub struct MatchEngine<'a> {
	snapshot: &'a LedgerSnapshot,
	strategies: Vec<Box<dyn MatchStrategy>>,
}

impl<'a> MatchEngine<'a> {
	pub fn new(snapshot: &'a LedgerSnapshot) -> Self {
		Self::with_strategies(snapshot, default_strategies())
	}

	pub fn with_strategies(snapshot: &'a LedgerSnapshot, strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
		Self {
			snapshot,
			strategies,
		}
	}

	/// Find the ledger account for an aggregator account.
	pub fn match_account(&self, account: &AggregatorAccount) -> Result<MatchResult, SyncError> {
		self.match_identifier(account.identifier())
	}

	/// Try each strategy in order against `identifier`.
	///
	/// A blank identifier never matches. A strategy that finds more than one account reports
	/// `AmbiguousMatch` instead of falling through to the next strategy.
	pub fn match_identifier(&self, identifier: &str) -> Result<MatchResult, SyncError> {
		let Some(wanted) = normalize_identifier(identifier) else {
			return Ok(MatchResult::NotFound);
		};

		for strategy in &self.strategies {
			let hits: Vec<&LedgerAccount> = self
				.snapshot
				.accounts()
				.iter()
				.filter(|candidate| {
					strategy
						.field(candidate)
						.and_then(normalize_identifier)
						.is_some_and(|field| field == wanted)
				})
				.collect();

			match hits.as_slice() {
				[] => continue,
				[account] => {
					debug!(
						"Matched '{}' to ledger account {} by {}",
						identifier,
						account.ledger_id,
						strategy.name()
					);
					return Ok(MatchResult::Matched {
						account: (*account).clone(),
						strategy: strategy.name(),
					});
				}
				_ => {
					return Err(SyncError::AmbiguousMatch {
						identifier: identifier.to_string(),
						strategy: strategy.name(),
						ledger_ids: hits.iter().map(|a| a.ledger_id.clone()).collect(),
					});
				}
			}
		}

		Ok(MatchResult::NotFound)
	}

	/// Find an expense or revenue account by name.
	pub fn match_counter_account(
		&self,
		account_type: LedgerAccountType,
		name: &str,
	) -> Result<MatchResult, SyncError> {
		let Some(wanted) = normalize_identifier(name) else {
			return Ok(MatchResult::NotFound);
		};

		let hits: Vec<&LedgerAccount> = self
			.snapshot
			.of_type(account_type)
			.filter(|candidate| normalize_identifier(&candidate.name).is_some_and(|n| n == wanted))
			.collect();

		match hits.as_slice() {
			[] => Ok(MatchResult::NotFound),
			[account] => Ok(MatchResult::Matched {
				account: (*account).clone(),
				strategy: "name",
			}),
			_ => Err(SyncError::AmbiguousMatch {
				identifier: name.to_string(),
				strategy: "name",
				ledger_ids: hits.iter().map(|a| a.ledger_id.clone()).collect(),
			}),
		}
	}
}

/// A transaction is synced once a ledger split carries its id as external reference.
pub fn is_transaction_synced(ledger_refs: &HashSet<String>, transaction: &AggregatorTransaction) -> bool {
	ledger_refs.contains(&transaction.id)
}
