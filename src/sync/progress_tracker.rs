//! Progress tracking for reconciliation passes.
//!
//! This module provides the `SyncProgressTracker`, which records per-stage counters while a pass
//! runs. Fetchers and the orchestrator record every fetched, cached, matched, created, skipped and
//! failed record here; the counters end up in the stage's `StageOutcome`.

use crate::cache::UpsertOutcome;
use crate::sync::types::{Stage, StageCounters};
use std::collections::HashMap;
use tracing::info;

/// Log a progress line every this many processed records.
const PROGRESS_LOG_INTERVAL: usize = 100;

/// Service for tracking pass progress
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
    /// The stage currently running, if any
    current_stage: Option<Stage>,
    /// Counters per stage for this pass
    counters: HashMap<Stage, StageCounters>,
    /// Records processed in the current stage when progress was last logged
    last_logged: usize,
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting for `stage`, resetting any earlier counters for it.
    pub fn begin_stage(&mut self, stage: Stage) {
        self.current_stage = Some(stage);
        self.counters.insert(stage, StageCounters::default());
        self.last_logged = 0;
    }

    /// Stop counting and return the counters of the stage that was running.
    pub fn finish_stage(&mut self) -> StageCounters {
        match self.current_stage.take() {
            Some(stage) => self.counters(stage),
            None => StageCounters::default(),
        }
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.current_stage
    }

    pub fn counters(&self, stage: Stage) -> StageCounters {
        self.counters.get(&stage).cloned().unwrap_or_default()
    }

    fn current(&mut self) -> &mut StageCounters {
        let stage = self.current_stage.unwrap_or(Stage::FetchLogins);
        self.counters.entry(stage).or_default()
    }

    /// Record records received from a provider
    pub fn record_fetched(&mut self, count: usize) {
        self.current().fetched += count;
    }

    /// Record the outcome of a cache upsert
    pub fn record_cached(&mut self, outcome: UpsertOutcome) {
        let counters = self.current();
        match outcome {
            UpsertOutcome::Created => counters.cached_new += 1,
            UpsertOutcome::Updated => counters.cached_updated += 1,
            UpsertOutcome::Unchanged => {}
        }
    }

    pub fn record_matched(&mut self) {
        self.current().matched += 1;
        self.log_progress(false);
    }

    pub fn record_created(&mut self) {
        self.current().created += 1;
        self.log_progress(false);
    }

    pub fn record_skipped(&mut self) {
        self.current().skipped += 1;
        self.log_progress(false);
    }

    pub fn record_failed(&mut self) {
        self.current().failed += 1;
        self.log_progress(false);
    }

    fn processed(counters: &StageCounters) -> usize {
        counters.matched + counters.created + counters.skipped + counters.failed
    }

    /// Log progress at regular intervals or when forced
    pub fn log_progress(&mut self, force: bool) {
        let Some(stage) = self.current_stage else {
            return;
        };
        let counters = self.counters(stage);
        let processed = Self::processed(&counters);
        let should_log = force || processed.saturating_sub(self.last_logged) >= PROGRESS_LOG_INTERVAL;

        if should_log {
            info!(
                "{} progress: {} processed ({} matched, {} created, {} skipped, {} failed)",
                stage,
                processed,
                counters.matched,
                counters.created,
                counters.skipped,
                counters.failed
            );
            self.last_logged = processed;
        }
    }
}
