use color_eyre::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use herald_domain::RunTrigger;
use herald_service::{RunCoordinator, scheduler};

/// Registers the recurring run and starts the cron clock. Expressions are evaluated in UTC.
pub async fn start_schedule(coordinator: &RunCoordinator, cron: &str) -> Result<JobScheduler> {
	let expression = scheduler::cron_expression(cron);
	let sched = JobScheduler::new().await?;
	let coordinator = coordinator.clone();
	let job = Job::new_async(expression.as_str(), move |_uuid, _l| {
		let coordinator = coordinator.clone();

		Box::pin(async move {
			let outcome = coordinator.trigger(RunTrigger::Schedule);

			tracing::info!(outcome = outcome.as_str(), "Scheduled run triggered.");
		})
	})?;

	sched.add(job).await?;
	sched.start().await?;

	tracing::info!(cron = %expression, "Run schedule started.");

	Ok(sched)
}

pub async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "Failed to listen for the shutdown signal.");

		std::future::pending::<()>().await;
	}
}
