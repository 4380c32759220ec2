use saltedge_firefly_sync::config::get_configuration;
use saltedge_firefly_sync::jobs::{JobError, JobService};
use saltedge_firefly_sync::sync::PassStatus;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_JOB_LIMIT: usize = 10;

/// Command line operations.
enum Command {
	/// Run one pass (default).
	Run,
	/// List recent passes.
	Jobs { limit: usize },
	/// Run a pass every configured interval until interrupted.
	Watch,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
	match args.first().map(String::as_str) {
		None | Some("run") => Ok(Command::Run),
		Some("watch") => Ok(Command::Watch),
		Some("jobs") => {
			let limit = match args.get(1) {
				Some(limit) => limit
					.parse()
					.map_err(|_| format!("invalid job limit '{}'", limit))?,
				None => DEFAULT_JOB_LIMIT,
			};
			Ok(Command::Jobs { limit })
		}
		Some(other) => Err(format!(
			"unknown command '{}' (expected run, jobs [limit] or watch)",
			other
		)),
	}
}

async fn run_once(service: &JobService) -> Result<bool, JobError> {
	let report = service.trigger().await?;
	info!("{}", report.summary());
	Ok(report.status == PassStatus::Completed)
}

async fn list_jobs(service: &JobService, limit: usize) -> Result<(), JobError> {
	let reports = service.list_recent(limit).await?;
	if reports.is_empty() {
		info!("No passes recorded yet");
	}
	for report in reports {
		info!("{}", report.summary());
		for outcome in &report.stages {
			info!(
				"  {:<28} {:?} created={} failed={}",
				outcome.stage.name(),
				outcome.status,
				outcome.counters.created,
				outcome.counters.failed
			);
		}
	}
	Ok(())
}

async fn watch(service: &JobService, interval: Duration) {
	let mut ticker = tokio::time::interval(interval);
	loop {
		tokio::select! {
			_ = ticker.tick() => {
				if let Err(e) = run_once(service).await {
					error!("Pass could not run: {}", e);
				}
			}
			_ = tokio::signal::ctrl_c() => {
				info!("Interrupted, stopping");
				return;
			}
		}
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,saltedge_firefly_sync=debug")),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.init();

	let args: Vec<String> = std::env::args().skip(1).collect();
	let command = match parse_args(&args) {
		Ok(command) => command,
		Err(e) => {
			error!("{}", e);
			return ExitCode::from(2);
		}
	};

	let settings = match get_configuration() {
		Ok(settings) => settings,
		Err(e) => {
			error!("Failed to load configuration: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let service = match JobService::from_settings(&settings) {
		Ok(service) => service,
		Err(e) => {
			error!("Failed to start reconciliation service: {}", e);
			return ExitCode::FAILURE;
		}
	};

	match command {
		Command::Run => match run_once(&service).await {
			Ok(true) => ExitCode::SUCCESS,
			Ok(false) => {
				warn!("Pass finished with errors; see the stage outcomes above");
				ExitCode::FAILURE
			}
			Err(e) => {
				error!("Pass could not run: {}", e);
				ExitCode::FAILURE
			}
		},
		Command::Jobs { limit } => match list_jobs(&service, limit).await {
			Ok(()) => ExitCode::SUCCESS,
			Err(e) => {
				error!("Failed to list passes: {}", e);
				ExitCode::FAILURE
			}
		},
		Command::Watch => {
			info!("Running a pass every {}s", settings.sync.interval_secs);
			watch(&service, settings.sync.interval()).await;
			ExitCode::SUCCESS
		}
	}
}
