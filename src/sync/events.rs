//! Event system for reconciliation passes.
//!
//! This module defines the events a pass emits, the handler trait, and the dispatcher the
//! orchestrator publishes through. Events decouple the reconciliation logic from whatever
//! observes it: the default `LoggingEventHandler` turns them into structured log lines, and
//! callers may register their own handlers (tests use one to assert on what a pass did).

use super::types::{PassReport, Stage, StageOutcome};
use crate::ledger::LedgerAccountType;
use crate::sync::types::SyncError;
use tracing::{debug, info, warn};

/// Events that occur during a reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
	/// A stage began
	StageStarted { stage: Stage },
	/// A stage ended with the given outcome
	StageFinished { outcome: StageOutcome },
	/// An aggregator account already has a ledger counterpart
	AccountMatched {
		aggregator_id: String,
		ledger_id: String,
		strategy: &'static str,
	},
	/// A ledger account was created for an aggregator account
	AccountCreated {
		aggregator_id: String,
		ledger_id: String,
		account_type: LedgerAccountType,
	},
	/// An expense or revenue account was created for a counter-party
	CounterAccountCreated {
		name: String,
		ledger_id: String,
		account_type: LedgerAccountType,
	},
	/// A ledger transaction was created
	TransactionCreated {
		aggregator_id: String,
		ledger_id: String,
	},
	/// A record was left alone or failed
	RecordSkipped {
		stage: Stage,
		record_id: String,
		reason: String,
	},
	/// The pass is over
	PassCompleted { report: PassReport },
}

/// Trait for handling sync events.
///
/// Implementors receive all sync events and can perform side effects or state updates.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
	/// Handle a sync event.
	///
	/// This method is called for every event dispatched by the orchestrator.
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError>;

	/// Get the name of this handler for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in the order they are registered.
#[derive(Default)]
pub struct EventDispatcher {
	handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
		self.handlers.push(handler);
	}

	/// Dispatch an event to all registered handlers.
	///
	/// Errors from handlers are logged, but do not stop other handlers from running.
	pub async fn dispatch(&mut self, event: &SyncEvent) {
		for handler in &mut self.handlers {
			if let Err(e) = handler.handle(event).await {
				tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
			}
		}
	}
}

/// Writes every event to the log.
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError> {
		match event {
			SyncEvent::StageStarted { stage } => info!("Stage {} started", stage),
			SyncEvent::StageFinished { outcome } => {
				let c = &outcome.counters;
				info!(
					"Stage {} finished: {:?} (fetched {}, matched {}, created {}, skipped {}, failed {})",
					outcome.stage, outcome.status, c.fetched, c.matched, c.created, c.skipped, c.failed
				);
			}
			SyncEvent::AccountMatched {
				aggregator_id,
				ledger_id,
				strategy,
			} => debug!(
				"Aggregator account {} matches ledger account {} by {}",
				aggregator_id, ledger_id, strategy
			),
			SyncEvent::AccountCreated {
				aggregator_id,
				ledger_id,
				account_type,
			} => info!(
				"Aggregator account {} mirrored as ledger {} account {}",
				aggregator_id, account_type, ledger_id
			),
			SyncEvent::CounterAccountCreated {
				name,
				ledger_id,
				account_type,
			} => info!("Counter-party '{}' created as {} account {}", name, account_type, ledger_id),
			SyncEvent::TransactionCreated {
				aggregator_id,
				ledger_id,
			} => debug!("Transaction {} created as ledger transaction {}", aggregator_id, ledger_id),
			SyncEvent::RecordSkipped {
				stage,
				record_id,
				reason,
			} => warn!("{}: skipped {}: {}", stage, record_id, reason),
			SyncEvent::PassCompleted { report } => info!("{}", report.summary()),
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"logging"
	}
}
