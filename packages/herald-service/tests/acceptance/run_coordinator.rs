use std::time::Duration;

use herald_domain::{RunOutcome, RunTrigger};
use herald_service::{RunCoordinator, TriggerOutcome};

use super::HarnessOptions;

fn slow() -> HarnessOptions {
	HarnessOptions { channel_delay: Duration::from_millis(150), ..Default::default() }
}

#[tokio::test]
async fn busy_triggers_queue_one_and_drop_the_rest() {
	let h = super::harness(slow());
	let coordinator = RunCoordinator::new(h.pipeline.clone(), true);

	assert_eq!(coordinator.trigger(RunTrigger::Schedule), TriggerOutcome::Started);
	assert!(coordinator.is_running());
	assert_eq!(coordinator.trigger(RunTrigger::Manual), TriggerOutcome::Queued);
	assert_eq!(coordinator.trigger(RunTrigger::Manual), TriggerOutcome::Dropped);

	coordinator.wait_idle().await;

	let runs = h.store.runs();

	assert_eq!(runs.len(), 2);
	assert_eq!(runs[0].trigger, RunTrigger::Schedule);
	assert_eq!(runs[1].trigger, RunTrigger::Manual);
	assert!(runs.iter().all(|run| run.is_finished()));
	assert!(!coordinator.is_running());
}

#[tokio::test]
async fn busy_triggers_are_dropped_when_queueing_is_off() {
	let h = super::harness(slow());
	let coordinator = RunCoordinator::new(h.pipeline.clone(), false);

	assert_eq!(coordinator.trigger(RunTrigger::Schedule), TriggerOutcome::Started);
	assert_eq!(coordinator.trigger(RunTrigger::Manual), TriggerOutcome::Dropped);

	coordinator.wait_idle().await;

	assert_eq!(h.store.runs().len(), 1);
}

#[tokio::test]
async fn run_now_returns_the_finished_run() {
	let h = super::harness(HarnessOptions::default());
	let coordinator = RunCoordinator::new(h.pipeline.clone(), true);
	let run = coordinator.run_now(RunTrigger::Manual).await.expect("Run was refused.");

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert_eq!(h.store.runs(), vec![run]);
	assert!(!coordinator.cancel_current());
}

#[tokio::test]
async fn shutdown_cancels_the_active_run_and_refuses_new_triggers() {
	let h = super::harness(slow());
	let coordinator = RunCoordinator::new(h.pipeline.clone(), true);

	assert_eq!(coordinator.trigger(RunTrigger::Schedule), TriggerOutcome::Started);
	assert_eq!(coordinator.trigger(RunTrigger::Manual), TriggerOutcome::Queued);

	coordinator.shutdown().await;

	assert_eq!(coordinator.trigger(RunTrigger::Manual), TriggerOutcome::Dropped);
	assert_eq!(h.store.runs().len(), 1);
	assert!(coordinator.run_now(RunTrigger::Manual).await.is_none());
}
