pub mod routes;
pub mod state;
pub mod worker;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::eyre::eyre;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;
use herald_domain::{RunOutcome, RunTrigger};
use herald_service::{Channel, Pipeline, PipelineSettings, Providers, RunCoordinator};
use herald_storage::{EventStore, PgStore, db::Db};

#[derive(Debug, Parser)]
#[command(
	version = herald_cli::VERSION,
	about = herald_cli::ABOUT,
	rename_all = "kebab",
	styles = herald_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Run the pipeline once and exit instead of serving the schedule.
	#[arg(long)]
	pub once: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = herald_config::load(&args.config)?;

	init_tracing(&config)?;

	let admin_addr: SocketAddr = config.service.admin_bind.parse()?;
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let store: Arc<dyn EventStore> = Arc::new(PgStore::new(&db));
	let channels = config.enabled_channels().map(Channel::from_config).collect::<Result<Vec<_>, _>>()?;

	tracing::info!(
		source = %config.source.url,
		channels = channels.len(),
		enrichment = config.providers.llm_summary.is_some(),
		"Pipeline configured."
	);

	let pipeline =
		Pipeline::new(PipelineSettings::from_config(&config), store, Providers::default(), channels)?;
	let coordinator = RunCoordinator::new(Arc::new(pipeline), config.scheduler.queue_when_busy);

	if args.once {
		return run_once(&coordinator).await;
	}

	let mut scheduler = worker::start_schedule(&coordinator, &config.scheduler.cron).await?;

	if config.scheduler.run_on_start {
		let outcome = coordinator.trigger(RunTrigger::Schedule);

		tracing::info!(outcome = outcome.as_str(), "Startup run triggered.");
	}

	let admin_listener = TcpListener::bind(admin_addr).await?;

	tracing::info!(%admin_addr, "Admin server listening.");

	axum::serve(admin_listener, routes::admin_router(AppState::new(coordinator.clone())))
		.with_graceful_shutdown(worker::shutdown_signal())
		.await?;

	tracing::info!("Shutting down. Waiting for the active run to stop.");

	scheduler.shutdown().await?;
	coordinator.shutdown().await;

	Ok(())
}

/// Runs the pipeline once, then shuts the coordinator down. A failed run is an error so the
/// process exits non-zero.
pub async fn run_once(coordinator: &RunCoordinator) -> color_eyre::Result<()> {
	let Some(run) = coordinator.run_now(RunTrigger::Manual).await else {
		return Ok(());
	};

	coordinator.shutdown().await;

	if run.outcome == Some(RunOutcome::Failed) {
		return Err(eyre!("Run {} failed.", run.run_id));
	}

	Ok(())
}

fn init_tracing(config: &herald_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
