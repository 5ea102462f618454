use std::{collections::HashSet, time::Duration};

use tokio_util::sync::CancellationToken;

use herald_domain::{RunOutcome, RunStage, RunTrigger};

use super::{Card, HarnessOptions};

fn three_events() -> String {
	let cards = (0..3)
		.map(|idx| Card {
			title: format!("Meetup {idx}"),
			start: super::upcoming(30 + idx),
			href: format!("/akce/meetup-{idx}"),
			location: "Prague".to_string(),
		})
		.collect::<Vec<_>>();

	super::listing(&cards)
}

#[tokio::test]
async fn cancelled_before_commit_stores_nothing() {
	let h = super::harness(HarnessOptions::default());
	let cancel = CancellationToken::new();

	cancel.cancel();

	let run = h.pipeline.run(RunTrigger::Manual, cancel).await;

	assert!(run.cancelled);
	assert_eq!(run.outcome, Some(RunOutcome::PartialFailure));
	assert!(run.errors.iter().any(|err| err.stage == RunStage::Cancel));
	assert!(h.store.events().is_empty());
	assert!(h.email.sent_keys().is_empty());
}

#[tokio::test]
async fn cancellation_mid_dispatch_keeps_sent_work_and_resumes_next_run() {
	let h = super::harness(HarnessOptions {
		page: three_events(),
		channel_delay: Duration::from_millis(200),
		..Default::default()
	});
	let cancel = CancellationToken::new();
	let stopper = cancel.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(100)).await;
		stopper.cancel();
	});

	let interrupted = h.pipeline.run(RunTrigger::Manual, cancel).await;

	assert!(interrupted.cancelled);
	assert_eq!(interrupted.outcome, Some(RunOutcome::PartialFailure));
	assert_eq!(interrupted.counts.new, 3);
	assert_eq!(h.store.events().len(), 3);
	assert_eq!(h.email.sent_keys().len(), 1);

	let resumed = h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;

	assert_eq!(resumed.outcome, Some(RunOutcome::Success));
	assert_eq!(resumed.counts.notified, 4);

	for channel in [&h.email, &h.telegram] {
		let keys = channel.sent_keys();
		let unique = keys.iter().collect::<HashSet<_>>();

		assert_eq!(keys.len(), 3);
		assert_eq!(unique.len(), 3);
	}
}
