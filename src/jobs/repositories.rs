use super::JobError;
use crate::sync::PassReport;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Repository for pass execution history
#[async_trait::async_trait]
pub trait JobRepository: Send + Sync {
	/// Store a finished pass, evicting the oldest beyond the history limit.
	async fn save(&self, report: &PassReport) -> Result<(), JobError>;

	/// Most recent passes first.
	async fn list_recent(&self, limit: usize) -> Result<Vec<PassReport>, JobError>;

	/// Id for the next pass.
	async fn next_id(&self) -> Result<u64, JobError>;
}

fn push_bounded(history: &mut Vec<PassReport>, report: &PassReport, keep: usize) {
	history.retain(|r| r.id != report.id);
	history.push(report.clone());
	history.sort_by_key(|r| r.id);
	let excess = history.len().saturating_sub(keep.max(1));
	history.drain(..excess);
}

fn most_recent(history: &[PassReport], limit: usize) -> Vec<PassReport> {
	history.iter().rev().take(limit).cloned().collect()
}

/// In-memory implementation of JobRepository
pub struct InMemoryJobRepository {
	history: RwLock<Vec<PassReport>>,
	keep: usize,
}

impl InMemoryJobRepository {
	pub fn new(keep: usize) -> Self {
		Self {
			history: RwLock::new(Vec::new()),
			keep,
		}
	}
}

#[async_trait::async_trait]
impl JobRepository for InMemoryJobRepository {
	async fn save(&self, report: &PassReport) -> Result<(), JobError> {
		push_bounded(&mut *self.history.write().await, report, self.keep);
		Ok(())
	}

	async fn list_recent(&self, limit: usize) -> Result<Vec<PassReport>, JobError> {
		Ok(most_recent(&self.history.read().await, limit))
	}

	async fn next_id(&self) -> Result<u64, JobError> {
		Ok(self.history.read().await.last().map_or(1, |r| r.id + 1))
	}
}

/// File-based implementation of JobRepository
///
/// The history lives in `jobs.json` under the data directory.
pub struct FileJobRepository {
	data_dir: PathBuf,
	keep: usize,
	lock: Mutex<()>,
}

impl FileJobRepository {
	pub fn new(data_dir: PathBuf, keep: usize) -> Self {
		Self {
			data_dir,
			keep,
			lock: Mutex::new(()),
		}
	}

	fn get_history_filename(&self) -> PathBuf {
		self.data_dir.join("jobs.json")
	}

	async fn load(&self) -> Result<Vec<PassReport>, JobError> {
		let path = self.get_history_filename();
		if !tokio::fs::try_exists(&path).await? {
			return Ok(Vec::new());
		}
		let content = tokio::fs::read_to_string(&path).await?;
		if content.trim().is_empty() {
			return Ok(Vec::new());
		}
		Ok(serde_json::from_str(&content)?)
	}
}

#[async_trait::async_trait]
impl JobRepository for FileJobRepository {
	async fn save(&self, report: &PassReport) -> Result<(), JobError> {
		let _guard = self.lock.lock().await;
		let mut history = self.load().await?;
		push_bounded(&mut history, report, self.keep);

		tokio::fs::create_dir_all(&self.data_dir).await?;
		let path = self.get_history_filename();
		let tmp = path.with_extension("json.tmp");
		tokio::fs::write(&tmp, serde_json::to_string_pretty(&history)?).await?;
		tokio::fs::rename(&tmp, &path).await?;

		debug!("Saved pass {} to {:?}", report.id, path);
		Ok(())
	}

	async fn list_recent(&self, limit: usize) -> Result<Vec<PassReport>, JobError> {
		let _guard = self.lock.lock().await;
		Ok(most_recent(&self.load().await?, limit))
	}

	async fn next_id(&self) -> Result<u64, JobError> {
		let _guard = self.lock.lock().await;
		Ok(self.load().await?.last().map_or(1, |r| r.id + 1))
	}
}
