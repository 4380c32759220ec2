//! Reconciliation orchestrator.
//!
//! This module defines the `ReconciliationOrchestrator`, which drives one reconciliation pass
//! between the aggregator and the ledger. A pass walks the fixed stage list in [`Stage::ORDER`]:
//!
//! - `FetchLogins`: list aggregator logins and cache them
//! - `FetchAggregatorAccounts`: list the accounts of every login and cache them
//! - `FetchLedgerAccounts`: load the ledger account snapshot used for matching
//! - `SyncAccounts`: match every cached aggregator account and create the missing ones
//! - `FetchAggregatorTransactions`: list posted transactions of every cached account
//! - `FetchLedgerTransactions`: collect the aggregator references already in the ledger
//! - `SyncTransactions`: create the missing transactions and their counter-accounts
//!
//! A failing stage is recorded and the pass moves on. Stages that write to the ledger are skipped
//! when the ledger state they depend on could not be loaded. Only the pass time limit ends a pass
//! early.

use super::events::{EventDispatcher, LoggingEventHandler, SyncEvent, SyncEventHandler};
use super::match_engine::{MatchEngine, MatchResult, is_transaction_synced};
use super::progress_tracker::SyncProgressTracker;
use super::snapshot::LedgerSnapshot;
use super::types::{PassReport, PassStatus, Stage, StageOutcome, StageStatus, SyncError};
use crate::aggregator::{AggregatorAccount, AggregatorFetcher, AggregatorTransaction, Login};
use crate::cache::{FileRecordCache, RecordCache};
use crate::config::{LiabilitySettings, Settings};
use crate::ledger::{LedgerAccount, LedgerFetcher, LedgerWriter};
use crate::provider::{HttpProviderClient, ProviderClient, ProviderError};
use crate::utils::{format_amount, normalize_identifier};

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Configuration for a reconciliation pass
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard upper bound on the whole pass
    pub pass_timeout: Duration,
    /// Restricts the login listing to one aggregator customer
    pub customer_id: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pass_timeout: Duration::from_secs(900),
            customer_id: None,
        }
    }
}

/// A posted aggregator transaction together with the account it belongs to.
#[derive(Debug, Clone)]
struct PendingTransaction {
    account: AggregatorAccount,
    transaction: AggregatorTransaction,
}

/// Everything a pass accumulates between stages.
///
/// `None` means the producing stage failed, which tells later stages to fall back or skip.
#[derive(Default)]
struct PassState {
    logins: Option<Vec<Login>>,
    ledger_snapshot: Option<LedgerSnapshot>,
    transactions: Vec<PendingTransaction>,
    ledger_refs: Option<HashSet<String>>,
    progress: SyncProgressTracker,
    stage_started_at: Option<DateTime<Utc>>,
    outcomes: Vec<StageOutcome>,
}

/// Drives reconciliation passes.
///
/// The orchestrator owns the fetchers and the writer for both providers and publishes every
/// decision through its event dispatcher. It holds no state between passes other than what the
/// record cache persists.
pub struct ReconciliationOrchestrator {
    aggregator: AggregatorFetcher,
    ledger: LedgerFetcher,
    writer: LedgerWriter,
    dispatcher: EventDispatcher,
    config: OrchestratorConfig,
}

impl ReconciliationOrchestrator {
    /// Create an orchestrator over the given provider clients and cache.
    ///
    /// A `LoggingEventHandler` is registered by default.
    pub fn new(
        aggregator_client: Arc<dyn ProviderClient>,
        ledger_client: Arc<dyn ProviderClient>,
        cache: Arc<dyn RecordCache>,
        liability: LiabilitySettings,
        config: OrchestratorConfig,
    ) -> Self {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(LoggingEventHandler));

        Self {
            aggregator: AggregatorFetcher::new(aggregator_client, cache),
            ledger: LedgerFetcher::new(ledger_client.clone()),
            writer: LedgerWriter::new(ledger_client, liability),
            dispatcher,
            config,
        }
    }

    /// Wire up HTTP clients and the file-backed cache from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let aggregator = HttpProviderClient::salt_edge(&settings.aggregator, &settings.http)?;
        let ledger = HttpProviderClient::firefly(&settings.ledger, &settings.http)?;
        let cache = FileRecordCache::new(settings.sync.data_dir.clone());

        Ok(Self::new(
            Arc::new(aggregator),
            Arc::new(ledger),
            Arc::new(cache),
            settings.liability.clone(),
            OrchestratorConfig {
                pass_timeout: settings.sync.pass_timeout(),
                customer_id: settings.aggregator.customer_id.clone(),
            },
        ))
    }

    /// Register an additional event handler.
    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.dispatcher.register_handler(handler);
    }

    /// Run one pass and report what every stage did.
    ///
    /// The pass never returns an error: stage and record failures are recorded in the report, and
    /// hitting the time limit yields a `TimedOut` report with the interrupted stage marked failed.
    pub async fn run_pass(&mut self, id: u64) -> PassReport {
        info!("Starting reconciliation pass {}", id);
        let started_at = Utc::now();
        let mut state = PassState::default();

        let timed_out = tokio::time::timeout(self.config.pass_timeout, self.run_stages(&mut state))
            .await
            .is_err();

        if timed_out {
            let error = SyncError::PassTimeout(self.config.pass_timeout);
            error!("Pass {} aborted: {}", id, error);
            if let Some(stage) = state.progress.current_stage() {
                self.finish_stage(&mut state, stage, StageStatus::Failed(error.to_string()))
                    .await;
            }
        }

        let status = if timed_out {
            PassStatus::TimedOut
        } else if state
            .outcomes
            .iter()
            .any(|o| !matches!(o.status, StageStatus::Completed) || o.counters.failed > 0)
        {
            PassStatus::CompletedWithErrors
        } else {
            PassStatus::Completed
        };

        let report = PassReport {
            id,
            status,
            started_at,
            finished_at: Utc::now(),
            stages: state.outcomes,
        };
        self.dispatcher
            .dispatch(&SyncEvent::PassCompleted {
                report: report.clone(),
            })
            .await;
        report
    }

    async fn run_stages(&mut self, state: &mut PassState) {
        for stage in Stage::ORDER {
            state.progress.begin_stage(stage);
            state.stage_started_at = Some(Utc::now());
            self.dispatcher
                .dispatch(&SyncEvent::StageStarted { stage })
                .await;

            let status = match self.execute(stage, state).await {
                Ok(status) => status,
                Err(e) => {
                    error!("Stage {} failed: {}", stage, e);
                    StageStatus::Failed(e.to_string())
                }
            };
            self.finish_stage(state, stage, status).await;
        }
    }

    async fn finish_stage(&mut self, state: &mut PassState, stage: Stage, status: StageStatus) {
        state.progress.log_progress(true);
        let outcome = StageOutcome {
            stage,
            status,
            counters: state.progress.finish_stage(),
            started_at: state.stage_started_at.take().unwrap_or_else(Utc::now),
            finished_at: Utc::now(),
        };
        state.outcomes.push(outcome.clone());
        self.dispatcher
            .dispatch(&SyncEvent::StageFinished { outcome })
            .await;
    }

    async fn execute(&mut self, stage: Stage, state: &mut PassState) -> Result<StageStatus, SyncError> {
        match stage {
            Stage::FetchLogins => {
                let logins = self
                    .aggregator
                    .fetch_logins(self.config.customer_id.as_deref(), &mut state.progress)
                    .await?;
                state.logins = Some(logins);
            }
            Stage::FetchAggregatorAccounts => self.fetch_aggregator_accounts(state).await?,
            Stage::FetchLedgerAccounts => {
                let accounts = self.ledger.fetch_accounts(&mut state.progress).await?;
                state.ledger_snapshot = Some(LedgerSnapshot::new(accounts));
            }
            Stage::SyncAccounts => return self.sync_accounts(state).await,
            Stage::FetchAggregatorTransactions => self.fetch_aggregator_transactions(state).await?,
            Stage::FetchLedgerTransactions => {
                let refs = self.ledger.fetch_transaction_refs(&mut state.progress).await?;
                state.ledger_refs = Some(refs);
            }
            Stage::SyncTransactions => return self.sync_transactions(state).await,
        }
        Ok(StageStatus::Completed)
    }

    async fn skip(&mut self, state: &mut PassState, record_id: &str, reason: String) {
        state.progress.record_skipped();
        self.dispatcher
            .dispatch(&SyncEvent::RecordSkipped {
                stage: state.progress.current_stage().unwrap_or(Stage::FetchLogins),
                record_id: record_id.to_string(),
                reason,
            })
            .await;
    }

    async fn fail(&mut self, state: &mut PassState, record_id: &str, error: SyncError) {
        error!("{}", error);
        state.progress.record_failed();
        self.dispatcher
            .dispatch(&SyncEvent::RecordSkipped {
                stage: state.progress.current_stage().unwrap_or(Stage::FetchLogins),
                record_id: record_id.to_string(),
                reason: error.to_string(),
            })
            .await;
    }

    /// Fetch accounts login by login; falls back to cached logins when the listing failed.
    async fn fetch_aggregator_accounts(&mut self, state: &mut PassState) -> Result<(), SyncError> {
        let logins = match &state.logins {
            Some(logins) => logins.clone(),
            None => {
                warn!("Login listing unavailable, using cached logins");
                self.aggregator.load_cached::<Login>(&mut state.progress).await?
            }
        };

        let mut failures = 0;
        for login in &logins {
            if let Err(e) = self.aggregator.fetch_accounts(&login.id, &mut state.progress).await {
                failures += 1;
                self.fail(state, &login.id, e).await;
            }
        }

        if failures > 0 && failures == logins.len() {
            return Err(SyncError::fetch(
                "aggregator accounts",
                format!("all {} logins failed", failures),
            ));
        }
        Ok(())
    }

    /// Match every cached aggregator account and create the ones the ledger lacks.
    async fn sync_accounts(&mut self, state: &mut PassState) -> Result<StageStatus, SyncError> {
        if state.ledger_snapshot.is_none() {
            return Ok(StageStatus::Skipped("ledger accounts unavailable".to_string()));
        }
        let accounts = self
            .aggregator
            .load_cached::<AggregatorAccount>(&mut state.progress)
            .await?;
        info!("Reconciling {} aggregator accounts", accounts.len());

        for account in accounts {
            if normalize_identifier(account.identifier()).is_none() {
                self.skip(state, &account.id, "account has no identifier".to_string())
                    .await;
                continue;
            }

            let result = match &state.ledger_snapshot {
                Some(snapshot) => MatchEngine::new(snapshot).match_account(&account),
                None => Ok(MatchResult::NotFound),
            };

            match result {
                Ok(MatchResult::Matched {
                    account: ledger_account,
                    strategy,
                }) => {
                    state.progress.record_matched();
                    self.dispatcher
                        .dispatch(&SyncEvent::AccountMatched {
                            aggregator_id: account.id.clone(),
                            ledger_id: ledger_account.ledger_id,
                            strategy,
                        })
                        .await;
                }
                Ok(MatchResult::NotFound) => match self.writer.create_account(&account).await {
                    Ok(created) => {
                        state.progress.record_created();
                        self.dispatcher
                            .dispatch(&SyncEvent::AccountCreated {
                                aggregator_id: account.id.clone(),
                                ledger_id: created.ledger_id.clone(),
                                account_type: created.account_type,
                            })
                            .await;
                        if let Some(snapshot) = state.ledger_snapshot.as_mut() {
                            snapshot.insert(created);
                        }
                    }
                    Err(e) => self.fail(state, &account.id, e).await,
                },
                Err(e) => self.fail(state, &account.id, e).await,
            }
        }

        Ok(StageStatus::Completed)
    }

    /// Fetch posted transactions for every cached aggregator account.
    async fn fetch_aggregator_transactions(&mut self, state: &mut PassState) -> Result<(), SyncError> {
        let accounts = self
            .aggregator
            .load_cached::<AggregatorAccount>(&mut state.progress)
            .await?;

        let mut failures = 0;
        for account in &accounts {
            match self
                .aggregator
                .fetch_transactions(account, &mut state.progress)
                .await
            {
                Ok(transactions) => {
                    state
                        .transactions
                        .extend(transactions.into_iter().map(|transaction| PendingTransaction {
                            account: account.clone(),
                            transaction,
                        }))
                }
                Err(e) => {
                    failures += 1;
                    self.fail(state, &account.id, e).await;
                }
            }
        }

        if failures > 0 && failures == accounts.len() {
            return Err(SyncError::fetch(
                "aggregator transactions",
                format!("all {} accounts failed", failures),
            ));
        }
        Ok(())
    }

    /// Create every fetched transaction the ledger does not reference yet.
    async fn sync_transactions(&mut self, state: &mut PassState) -> Result<StageStatus, SyncError> {
        if state.ledger_snapshot.is_none() {
            return Ok(StageStatus::Skipped("ledger accounts unavailable".to_string()));
        }
        if state.ledger_refs.is_none() {
            return Ok(StageStatus::Skipped(
                "ledger transactions unavailable".to_string(),
            ));
        }

        let pending = std::mem::take(&mut state.transactions);
        info!("Reconciling {} aggregator transactions", pending.len());

        for PendingTransaction {
            account,
            transaction,
        } in pending
        {
            if let Err(e) = self.sync_transaction(state, &account, &transaction).await {
                self.fail(state, &transaction.id, e).await;
            }
        }

        Ok(StageStatus::Completed)
    }

    async fn sync_transaction(
        &mut self,
        state: &mut PassState,
        account: &AggregatorAccount,
        transaction: &AggregatorTransaction,
    ) -> Result<(), SyncError> {
        if state
            .ledger_refs
            .as_ref()
            .is_some_and(|refs| is_transaction_synced(refs, transaction))
        {
            state.progress.record_matched();
            return Ok(());
        }
        if transaction.amount.is_zero() {
            self.skip(state, &transaction.id, "zero amount".to_string())
                .await;
            return Ok(());
        }

        let Some(asset) = self.resolve_asset(state, account)? else {
            self.skip(
                state,
                &transaction.id,
                format!("account {} is not in the ledger yet", account.identifier()),
            )
            .await;
            return Ok(());
        };
        let counter = self.resolve_counter_account(state, transaction).await?;

        let created = self
            .writer
            .create_transaction(transaction, &asset, &counter)
            .await?;
        info!(
            "Synced transaction {} ({}, {})",
            transaction.id,
            transaction.description.trim(),
            format_amount(transaction.amount, &transaction.currency_code)
        );

        state.progress.record_created();
        if let Some(refs) = state.ledger_refs.as_mut() {
            refs.insert(transaction.id.clone());
        }
        self.dispatcher
            .dispatch(&SyncEvent::TransactionCreated {
                aggregator_id: transaction.id.clone(),
                ledger_id: created.ledger_id,
            })
            .await;
        Ok(())
    }

    fn resolve_asset(
        &self,
        state: &PassState,
        account: &AggregatorAccount,
    ) -> Result<Option<LedgerAccount>, SyncError> {
        let Some(snapshot) = &state.ledger_snapshot else {
            return Ok(None);
        };
        Ok(MatchEngine::new(snapshot)
            .match_account(account)?
            .account()
            .cloned())
    }

    /// Find the counter-party account, creating it on first sight.
    async fn resolve_counter_account(
        &mut self,
        state: &mut PassState,
        transaction: &AggregatorTransaction,
    ) -> Result<LedgerAccount, SyncError> {
        let account_type = LedgerWriter::counter_account_type(transaction.amount);
        let name = LedgerWriter::counter_account_name(transaction);

        let existing = match &state.ledger_snapshot {
            Some(snapshot) => MatchEngine::new(snapshot)
                .match_counter_account(account_type, name)?
                .account()
                .cloned(),
            None => None,
        };
        if let Some(account) = existing {
            return Ok(account);
        }

        let created = self.writer.create_counter_account(transaction).await?;
        state.progress.record_created();
        self.dispatcher
            .dispatch(&SyncEvent::CounterAccountCreated {
                name: name.to_string(),
                ledger_id: created.ledger_id.clone(),
                account_type: created.account_type,
            })
            .await;
        if let Some(snapshot) = state.ledger_snapshot.as_mut() {
            snapshot.insert(created.clone());
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryRecordCache;
    use crate::ledger::LedgerAccountType;
    use crate::provider::ProviderResponse;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for a provider: canned GETs, POSTs echoed back as created resources.
    #[derive(Default)]
    struct FakeProvider {
        gets: HashMap<String, Value>,
        reject_names: HashSet<String>,
        delay: Option<Duration>,
        posted: Mutex<Vec<(String, Value)>>,
    }

    impl FakeProvider {
        fn get(mut self, path: &str, body: Value) -> Self {
            self.gets.insert(path.to_string(), body);
            self
        }

        fn posts(&self, path: &str) -> Vec<Value> {
            self.posted
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == path)
                .map(|(_, body)| body.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl ProviderClient for FakeProvider {
        async fn get(&self, path: &str) -> Option<ProviderResponse> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.gets.get(path).map(|body| ProviderResponse {
                status: 200,
                body: body.clone(),
            })
        }

        async fn post(&self, path: &str, payload: &Value) -> Option<ProviderResponse> {
            if let Some(name) = payload["name"].as_str() {
                if self.reject_names.contains(name) {
                    return None;
                }
            }
            let mut posted = self.posted.lock().unwrap();
            posted.push((path.to_string(), payload.clone()));
            let id = format!("{}", 100 + posted.len());
            Some(ProviderResponse {
                status: 200,
                body: json!({ "data": { "id": id, "attributes": payload } }),
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct Recorder(Arc<Mutex<Vec<SyncEvent>>>);

    #[async_trait::async_trait]
    impl SyncEventHandler for Recorder {
        async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    /// Stalls on every `StageFinished` event.
    struct StallingHandler;

    #[async_trait::async_trait]
    impl SyncEventHandler for StallingHandler {
        async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError> {
            if matches!(event, SyncEvent::StageFinished { .. }) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stalling"
        }
    }

    fn aggregator() -> FakeProvider {
        FakeProvider::default()
            .get("logins", json!({ "data": [{ "id": "7" }] }))
            .get(
                "accounts?login_id=7",
                json!({ "data": [{
                    "id": "1", "login_id": "7", "name": "NL01BANK0123456789",
                    "nature": "checking", "balance": 250.0, "currency_code": "EUR"
                }] }),
            )
            .get(
                "transactions?login_id=7&account_id=1",
                json!({ "data": [
                    { "id": "t1", "account_id": "1", "description": "Jumbo", "amount": -12.5,
                      "currency_code": "EUR", "made_on": "2020-06-01" },
                    { "id": "t2", "account_id": "1", "description": "jumbo ", "amount": -7.25,
                      "currency_code": "EUR", "made_on": "2020-06-02" },
                    { "id": "t3", "account_id": "1", "description": "Salary", "amount": 2000,
                      "currency_code": "EUR", "made_on": "2020-06-03" },
                    { "id": "t4", "account_id": "1", "description": "Fee refund", "amount": 0,
                      "currency_code": "EUR", "made_on": "2020-06-04" }
                ] }),
            )
    }

    fn empty_ledger() -> FakeProvider {
        FakeProvider::default()
            .get("accounts?page=1", json!({ "data": [] }))
            .get("transactions?page=1", json!({ "data": [] }))
    }

    fn orchestrator(
        aggregator: Arc<FakeProvider>,
        ledger: Arc<FakeProvider>,
        cache: Arc<InMemoryRecordCache>,
    ) -> (ReconciliationOrchestrator, Arc<Mutex<Vec<SyncEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut orchestrator = ReconciliationOrchestrator::new(
            aggregator,
            ledger,
            cache,
            LiabilitySettings::default(),
            OrchestratorConfig::default(),
        );
        orchestrator.register_handler(Box::new(Recorder(events.clone())));
        (orchestrator, events)
    }

    #[tokio::test]
    async fn full_pass_creates_accounts_counter_accounts_and_transactions() {
        let ledger = Arc::new(empty_ledger());
        let (mut orchestrator, events) = orchestrator(
            Arc::new(aggregator()),
            ledger.clone(),
            Arc::new(InMemoryRecordCache::new()),
        );

        let report = orchestrator.run_pass(1).await;

        assert_eq!(report.status, PassStatus::Completed);
        assert_eq!(report.stages.len(), Stage::ORDER.len());

        let accounts = ledger.posts("accounts");
        let names: Vec<&str> = accounts.iter().filter_map(|a| a["name"].as_str()).collect();
        assert_eq!(names, vec!["NL01BANK0123456789", "Jumbo", "Salary"]);
        assert_eq!(accounts[1]["type"], json!("expense"));
        assert_eq!(accounts[2]["type"], json!("revenue"));

        let transactions = ledger.posts("transactions");
        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0]["transactions"][0]["type"], json!("withdrawal"));
        assert_eq!(transactions[2]["transactions"][0]["type"], json!("deposit"));

        let sync = report.outcome(Stage::SyncTransactions).unwrap();
        assert_eq!(sync.counters.skipped, 1);
        assert!(events.lock().unwrap().iter().any(|e| matches!(
            e,
            SyncEvent::CounterAccountCreated { name, account_type: LedgerAccountType::Expense, .. }
                if name == "Jumbo"
        )));
    }

    #[tokio::test]
    async fn ledger_outage_skips_the_sync_stages() {
        let ledger = Arc::new(FakeProvider::default());
        let (mut orchestrator, _) = orchestrator(
            Arc::new(aggregator()),
            ledger.clone(),
            Arc::new(InMemoryRecordCache::new()),
        );

        let report = orchestrator.run_pass(1).await;

        assert_eq!(report.status, PassStatus::CompletedWithErrors);
        assert!(report.outcome(Stage::FetchLedgerAccounts).unwrap().is_failed());
        assert!(matches!(
            report.outcome(Stage::SyncAccounts).unwrap().status,
            StageStatus::Skipped(_)
        ));
        assert_eq!(
            report.outcome(Stage::FetchAggregatorTransactions).unwrap().status,
            StageStatus::Completed
        );
        assert!(ledger.posts("accounts").is_empty());
    }

    #[tokio::test]
    async fn undecodable_ledger_account_blocks_account_creation() {
        let ledger = FakeProvider::default()
            .get(
                "accounts?page=1",
                json!({ "data": [
                    { "id": "5", "attributes": { "name": "Main", "type": "asset",
                      "iban": "NL01BANK0123456789", "opening_balance": "n/a" } }
                ] }),
            )
            .get("transactions?page=1", json!({ "data": [] }));
        let ledger = Arc::new(ledger);
        let (mut orchestrator, _) = orchestrator(
            Arc::new(aggregator()),
            ledger.clone(),
            Arc::new(InMemoryRecordCache::new()),
        );

        let report = orchestrator.run_pass(1).await;

        assert_eq!(report.status, PassStatus::CompletedWithErrors);
        assert!(report.outcome(Stage::FetchLedgerAccounts).unwrap().is_failed());
        assert!(matches!(
            report.outcome(Stage::SyncAccounts).unwrap().status,
            StageStatus::Skipped(_)
        ));
        assert!(matches!(
            report.outcome(Stage::SyncTransactions).unwrap().status,
            StageStatus::Skipped(_)
        ));
        assert!(ledger.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_login_listing_falls_back_to_cache() {
        let cache = Arc::new(InMemoryRecordCache::new());
        let ledger = Arc::new(empty_ledger());
        let (mut first, _) = orchestrator(Arc::new(aggregator()), ledger.clone(), cache.clone());
        first.run_pass(1).await;

        let mut without_logins = aggregator();
        without_logins.gets.remove("logins");
        let (mut second, _) = orchestrator(Arc::new(without_logins), ledger, cache);
        let report = second.run_pass(2).await;

        assert!(report.outcome(Stage::FetchLogins).unwrap().is_failed());
        let accounts = report.outcome(Stage::FetchAggregatorAccounts).unwrap();
        assert_eq!(accounts.status, StageStatus::Completed);
        assert_eq!(accounts.counters.fetched, 1);
    }

    #[tokio::test]
    async fn rejected_account_does_not_stop_the_others() {
        let aggregator = aggregator().get(
            "accounts?login_id=7",
            json!({ "data": [
                { "id": "1", "login_id": "7", "name": "NL01REJECTED", "nature": "checking",
                  "balance": 1, "currency_code": "EUR" },
                { "id": "2", "login_id": "7", "name": "NL02ACCEPTED", "nature": "savings",
                  "balance": 2, "currency_code": "EUR" }
            ] }),
        );
        let mut ledger = empty_ledger();
        ledger.reject_names.insert("NL01REJECTED".to_string());
        let ledger = Arc::new(ledger);
        let (mut orchestrator, _) =
            orchestrator(Arc::new(aggregator), ledger.clone(), Arc::new(InMemoryRecordCache::new()));

        let report = orchestrator.run_pass(1).await;

        let sync = report.outcome(Stage::SyncAccounts).unwrap();
        assert_eq!(sync.counters.created, 1);
        assert_eq!(sync.counters.failed, 1);
        assert_eq!(report.status, PassStatus::CompletedWithErrors);
        assert_eq!(ledger.posts("accounts")[0]["name"], json!("NL02ACCEPTED"));
    }

    #[tokio::test]
    async fn already_referenced_transactions_are_not_recreated() {
        let ledger = FakeProvider::default()
            .get(
                "accounts?page=1",
                json!({ "data": [
                    { "id": "5", "attributes": { "name": "Main", "type": "asset",
                      "iban": "nl01bank0123456789" } },
                    { "id": "6", "attributes": { "name": "Jumbo", "type": "expense" } },
                    { "id": "8", "attributes": { "name": "Salary", "type": "revenue" } }
                ] }),
            )
            .get(
                "transactions?page=1",
                json!({ "data": [
                    { "id": "50", "attributes": { "transactions": [
                        { "external_id": "t1" }, { "external_id": "t2" }, { "external_id": "t3" }
                    ] } }
                ] }),
            );
        let ledger = Arc::new(ledger);
        let (mut orchestrator, _) = orchestrator(
            Arc::new(aggregator()),
            ledger.clone(),
            Arc::new(InMemoryRecordCache::new()),
        );

        let report = orchestrator.run_pass(1).await;

        assert_eq!(report.status, PassStatus::Completed);
        assert!(ledger.posted.lock().unwrap().is_empty());
        assert_eq!(report.outcome(Stage::SyncAccounts).unwrap().counters.matched, 1);
        assert_eq!(report.outcome(Stage::SyncTransactions).unwrap().counters.matched, 3);
    }

    #[tokio::test]
    async fn pass_timeout_marks_the_running_stage() {
        let mut slow = aggregator();
        slow.delay = Some(Duration::from_secs(5));
        let mut orchestrator = ReconciliationOrchestrator::new(
            Arc::new(slow),
            Arc::new(empty_ledger()),
            Arc::new(InMemoryRecordCache::new()),
            LiabilitySettings::default(),
            OrchestratorConfig {
                pass_timeout: Duration::from_millis(50),
                customer_id: None,
            },
        );

        let report = orchestrator.run_pass(3).await;

        assert_eq!(report.status, PassStatus::TimedOut);
        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].stage, Stage::FetchLogins);
        assert!(report.stages[0].is_failed());
    }

    #[tokio::test]
    async fn timeout_during_stage_event_keeps_the_finished_stage() {
        let mut orchestrator = ReconciliationOrchestrator::new(
            Arc::new(aggregator()),
            Arc::new(empty_ledger()),
            Arc::new(InMemoryRecordCache::new()),
            LiabilitySettings::default(),
            OrchestratorConfig {
                pass_timeout: Duration::from_millis(50),
                customer_id: None,
            },
        );
        orchestrator.register_handler(Box::new(StallingHandler));

        let report = orchestrator.run_pass(4).await;

        assert_eq!(report.status, PassStatus::TimedOut);
        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].stage, Stage::FetchLogins);
        assert_eq!(report.stages[0].status, StageStatus::Completed);
        assert_eq!(report.stages[0].counters.fetched, 1);
    }
}
