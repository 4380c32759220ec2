//! Runtime configuration.
//!
//! Settings are layered: an optional `config/base.yaml` file first, then environment variables
//! prefixed with `SYNC_` using `__` as the nesting separator (for example
//! `SYNC_LEDGER__ACCESS_TOKEN`). A `.env` file is honoured when present.

use chrono::NaiveDate;
use secrecy::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Clone)]
pub struct Settings {
	pub aggregator: AggregatorSettings,
	pub ledger: LedgerSettings,
	#[serde(default)]
	pub http: HttpSettings,
	#[serde(default)]
	pub sync: SyncSettings,
	#[serde(default)]
	pub liability: LiabilitySettings,
}

#[derive(Deserialize, Clone)]
pub struct AggregatorSettings {
	/// Salt Edge API root, e.g. `https://www.saltedge.com/api/v5/`.
	#[serde(default = "default_aggregator_url")]
	pub base_url: String,
	pub app_id: Secret<String>,
	pub secret: Secret<String>,
	/// Restricts the login listing to a single customer.
	#[serde(default)]
	pub customer_id: Option<String>,
}

fn default_aggregator_url() -> String {
	"https://www.saltedge.com/api/v5/".to_string()
}

#[derive(Deserialize, Clone)]
pub struct LedgerSettings {
	/// Firefly III API root, e.g. `https://firefly.example.com/api/v1/`.
	pub base_url: String,
	/// Personal access token.
	pub access_token: Secret<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct HttpSettings {
	/// Per-request timeout.
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
	/// Total time budget for retrying a failed GET.
	#[serde(default = "default_retry_budget_secs")]
	pub retry_budget_secs: u64,
}

impl HttpSettings {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	pub fn retry_budget(&self) -> Duration {
		Duration::from_secs(self.retry_budget_secs)
	}
}

impl Default for HttpSettings {
	fn default() -> Self {
		Self {
			timeout_secs: default_timeout_secs(),
			retry_budget_secs: default_retry_budget_secs(),
		}
	}
}

fn default_timeout_secs() -> u64 {
	30
}

fn default_retry_budget_secs() -> u64 {
	10
}

#[derive(Deserialize, Clone, Debug)]
pub struct SyncSettings {
	/// Hard upper bound on a whole reconciliation pass.
	#[serde(default = "default_pass_timeout_secs")]
	pub pass_timeout_secs: u64,
	/// Directory holding the record cache and job history.
	#[serde(default = "default_data_dir")]
	pub data_dir: PathBuf,
	/// Number of pass reports kept in the job history.
	#[serde(default = "default_job_history")]
	pub job_history: usize,
	/// Time between passes in `watch` mode.
	#[serde(default = "default_interval_secs")]
	pub interval_secs: u64,
}

impl SyncSettings {
	pub fn pass_timeout(&self) -> Duration {
		Duration::from_secs(self.pass_timeout_secs)
	}

	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.interval_secs)
	}
}

impl Default for SyncSettings {
	fn default() -> Self {
		Self {
			pass_timeout_secs: default_pass_timeout_secs(),
			data_dir: default_data_dir(),
			job_history: default_job_history(),
			interval_secs: default_interval_secs(),
		}
	}
}

fn default_pass_timeout_secs() -> u64 {
	900
}

fn default_data_dir() -> PathBuf {
	PathBuf::from("data")
}

fn default_job_history() -> usize {
	50
}

fn default_interval_secs() -> u64 {
	3600
}

/// Values applied to every liability account created in the ledger.
///
/// The aggregator reports neither the liability category nor its start date, so both come from
/// configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct LiabilitySettings {
	#[serde(default = "default_liability_type")]
	pub liability_type: String,
	#[serde(default = "default_liability_start_date")]
	pub start_date: NaiveDate,
	#[serde(default = "default_interest_period")]
	pub interest_period: String,
}

impl Default for LiabilitySettings {
	fn default() -> Self {
		Self {
			liability_type: default_liability_type(),
			start_date: default_liability_start_date(),
			interest_period: default_interest_period(),
		}
	}
}

fn default_liability_type() -> String {
	"mortgage".to_string()
}

fn default_liability_start_date() -> NaiveDate {
	NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

fn default_interest_period() -> String {
	"monthly".to_string()
}

/// Loads settings from `config/base.yaml` (if present) and the environment.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
	get_configuration_from(Path::new("config").join("base").as_path())
}

/// Loads settings from the given file stem (extension resolved by the `config` crate) and the
/// environment.
pub fn get_configuration_from(file_stem: &Path) -> Result<Settings, config::ConfigError> {
	dotenvy::dotenv().ok();

	let settings = config::Config::builder()
		.add_source(config::File::from(file_stem).required(false))
		.add_source(
			config::Environment::with_prefix("SYNC")
				.prefix_separator("_")
				.separator("__"),
		)
		.build()?;

	settings.try_deserialize::<Settings>()?.validate()
}

impl Settings {
	/// Rejects values the service cannot run with.
	pub fn validate(self) -> Result<Self, config::ConfigError> {
		if self.sync.interval_secs == 0 {
			return Err(config::ConfigError::Message(
				"sync.interval_secs must be at least 1".to_string(),
			));
		}
		Ok(self)
	}
}
