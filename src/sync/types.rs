use crate::cache::CacheError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Error taxonomy for a reconciliation pass.
///
/// Only `PassTimeout` ends a pass; every other variant is confined to the record or stage it
/// occurred in.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	/// Provider unreachable or returned an unusable payload.
	#[error("Could not fetch {what}: {reason}")]
	FetchFailure { what: String, reason: String },

	/// More than one ledger account satisfies the same identifier.
	#[error("Ambiguous {strategy} match for '{identifier}': ledger accounts {ledger_ids:?}")]
	AmbiguousMatch {
		identifier: String,
		strategy: &'static str,
		ledger_ids: Vec<String>,
	},

	/// The ledger rejected a create call.
	#[error("Ledger rejected creation of {what}: {reason}")]
	CreationFailure { what: String, reason: String },

	/// A single record had an unexpected shape.
	#[error("Malformed {what}: {reason}")]
	MalformedRecord { what: String, reason: String },

	#[error("Pass exceeded its time limit of {0:?}")]
	PassTimeout(Duration),

	#[error("Cache error: {0}")]
	CacheError(#[from] CacheError),
}

impl SyncError {
	pub fn fetch(what: impl Into<String>, reason: impl Into<String>) -> Self {
		SyncError::FetchFailure {
			what: what.into(),
			reason: reason.into(),
		}
	}

	pub fn creation(what: impl Into<String>, reason: impl Into<String>) -> Self {
		SyncError::CreationFailure {
			what: what.into(),
			reason: reason.into(),
		}
	}

	pub fn malformed(what: impl Into<String>, reason: impl Into<String>) -> Self {
		SyncError::MalformedRecord {
			what: what.into(),
			reason: reason.into(),
		}
	}
}

/// The stages of a pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
	FetchLogins,
	FetchAggregatorAccounts,
	FetchLedgerAccounts,
	SyncAccounts,
	FetchAggregatorTransactions,
	FetchLedgerTransactions,
	SyncTransactions,
}

impl Stage {
	/// Every stage in the order a pass runs them.
	pub const ORDER: [Stage; 7] = [
		Stage::FetchLogins,
		Stage::FetchAggregatorAccounts,
		Stage::FetchLedgerAccounts,
		Stage::SyncAccounts,
		Stage::FetchAggregatorTransactions,
		Stage::FetchLedgerTransactions,
		Stage::SyncTransactions,
	];

	pub fn name(&self) -> &'static str {
		match self {
			Stage::FetchLogins => "FetchLogins",
			Stage::FetchAggregatorAccounts => "FetchAggregatorAccounts",
			Stage::FetchLedgerAccounts => "FetchLedgerAccounts",
			Stage::SyncAccounts => "SyncAccounts",
			Stage::FetchAggregatorTransactions => "FetchAggregatorTransactions",
			Stage::FetchLedgerTransactions => "FetchLedgerTransactions",
			Stage::SyncTransactions => "SyncTransactions",
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
	Completed,
	Failed(String),
	Skipped(String),
}

/// Per-stage record counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
	/// Records received from a provider.
	pub fetched: usize,
	/// Cache entries created on first sighting.
	pub cached_new: usize,
	/// Cache entries whose content changed.
	pub cached_updated: usize,
	/// Records that already had a ledger counterpart.
	pub matched: usize,
	/// Ledger entities created.
	pub created: usize,
	/// Records deliberately left alone.
	pub skipped: usize,
	/// Records that failed.
	pub failed: usize,
}

/// The result record of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
	pub stage: Stage,
	pub status: StageStatus,
	pub counters: StageCounters,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
}

impl StageOutcome {
	pub fn is_failed(&self) -> bool {
		matches!(self.status, StageStatus::Failed(_))
	}
}

/// Overall result of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
	/// Every stage completed and no record failed.
	Completed,
	/// The pass ran to the end but a stage or record failed.
	CompletedWithErrors,
	/// The pass hit its time limit and was abandoned.
	TimedOut,
}

/// Execution record of one pass, as listed by the job surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
	pub id: u64,
	pub status: PassStatus,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	pub stages: Vec<StageOutcome>,
}

impl PassReport {
	pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
		self.stages.iter().find(|o| o.stage == stage)
	}

	/// Ledger entities created across all stages.
	pub fn created(&self) -> usize {
		self.stages.iter().map(|o| o.counters.created).sum()
	}

	pub fn summary(&self) -> String {
		let failed_stages = self.stages.iter().filter(|o| o.is_failed()).count();
		let failed_records: usize = self.stages.iter().map(|o| o.counters.failed).sum();
		format!(
			"Pass {} {:?} in {}s: {} stages run, {} created, {} failed stages, {} failed records",
			self.id,
			self.status,
			(self.finished_at - self.started_at).num_seconds(),
			self.stages.len(),
			self.created(),
			failed_stages,
			failed_records
		)
	}
}
