use tokio_util::sync::CancellationToken;

use herald_domain::{RunOutcome, RunTrigger};

use super::HarnessOptions;

#[tokio::test]
async fn identical_content_twice_sends_nothing_new() {
	let h = super::harness(HarnessOptions::default());
	let first = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;
	let second = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(first.counts.new, 1);
	assert_eq!(first.counts.notified, 2);
	assert_eq!(second.counts.unchanged, 1);
	assert_eq!(second.counts.new + second.counts.changed, 0);
	assert_eq!(second.counts.notified, 0);
	assert_eq!(second.outcome, Some(RunOutcome::Success));
	assert_eq!(h.email.sent_keys().len(), 1);
	assert_eq!(h.telegram.sent_keys().len(), 1);
	assert_eq!(h.store.deliveries().len(), 2);
}

#[tokio::test]
async fn unchanged_events_are_never_re_enriched() {
	let h = super::harness(HarnessOptions::default());

	for _ in 0..3 {
		h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;
	}

	assert_eq!(h.summary.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

	let event = h.store.events().pop().expect("Event was not stored.");

	assert_eq!(event.summary.as_deref(), Some("Summary of Title: PyData Meetup"));
}

#[tokio::test]
async fn in_batch_duplicates_collapse_to_one_event() {
	let page = super::listing(&[super::pydata("Prague"), super::pydata("Prague (room 2)")]);
	let h = super::harness(HarnessOptions { page, ..Default::default() });
	let run = h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;

	assert_eq!(run.counts.seen, 1);
	assert_eq!(h.store.events().len(), 1);
	assert_eq!(h.store.events()[0].location.as_deref(), Some("Prague"));
	assert_eq!(h.email.sent_keys().len(), 1);
}
