//! Job surface for operators.
//!
//! `JobService` triggers reconciliation passes on demand and lists the recent ones with their
//! stage outcomes. Only one pass runs at a time; a trigger while a pass is running is rejected.

/// Pass history storage
pub mod repositories;

pub use repositories::{FileJobRepository, InMemoryJobRepository, JobRepository};

use crate::config::Settings;
use crate::sync::{PassReport, ReconciliationOrchestrator};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Error types for the job surface
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("A reconciliation pass is already running")]
	AlreadyRunningError,

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	#[error("Provider setup error: {0}")]
	ProviderError(#[from] crate::provider::ProviderError),
}

/// Runs passes and keeps their history.
pub struct JobService {
	orchestrator: Mutex<ReconciliationOrchestrator>,
	repository: Arc<dyn JobRepository>,
}

impl JobService {
	pub fn new(orchestrator: ReconciliationOrchestrator, repository: Arc<dyn JobRepository>) -> Self {
		Self {
			orchestrator: Mutex::new(orchestrator),
			repository,
		}
	}

	/// HTTP providers, file cache and file history, all from settings.
	pub fn from_settings(settings: &Settings) -> Result<Self, JobError> {
		let orchestrator = ReconciliationOrchestrator::from_settings(settings)?;
		let repository = FileJobRepository::new(settings.sync.data_dir.clone(), settings.sync.job_history);
		Ok(Self::new(orchestrator, Arc::new(repository)))
	}

	/// Run a pass now and record it.
	pub async fn trigger(&self) -> Result<PassReport, JobError> {
		let Ok(mut orchestrator) = self.orchestrator.try_lock() else {
			return Err(JobError::AlreadyRunningError);
		};

		let id = self.repository.next_id().await?;
		let report = orchestrator.run_pass(id).await;
		self.repository.save(&report).await?;
		info!("Recorded pass {} as {:?}", report.id, report.status);
		Ok(report)
	}

	/// Recent passes, newest first.
	pub async fn list_recent(&self, limit: usize) -> Result<Vec<PassReport>, JobError> {
		self.repository.list_recent(limit).await
	}
}
