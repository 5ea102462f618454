use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use herald_domain::{DeliveryStatus, RunOutcome, RunStage, RunTrigger};

use super::{Card, HarnessOptions, SendMode};

fn two_events() -> String {
	super::listing(&[
		super::pydata("Prague"),
		Card {
			title: "Rust Meetup".to_string(),
			start: super::upcoming(40),
			href: "/akce/rust-meetup".to_string(),
			location: "Brno".to_string(),
		},
	])
}

#[tokio::test]
async fn permanent_failure_on_one_channel_does_not_block_the_other() {
	let h = super::harness(HarnessOptions { email: SendMode::Reject, ..Default::default() });
	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert_eq!(run.counts.delivery_failed_permanent, 1);
	assert_eq!(run.counts.notified, 1);
	assert_eq!(h.telegram.sent_keys().len(), 1);
	assert_eq!(h.email.attempts.load(Ordering::SeqCst), 1);
	assert_eq!(
		super::statuses(&h.store),
		vec![
			("email".to_string(), DeliveryStatus::FailedPermanent),
			("telegram".to_string(), DeliveryStatus::Sent),
		]
	);

	let record = &h.store.deliveries()[0];

	assert_eq!(record.attempt_count, 1);
	assert!(record.last_error.as_deref().is_some_and(|err| err.contains("422")));

	h.email.set_mode(SendMode::Accept);
	h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(h.email.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retryable_failure_is_picked_up_by_the_next_run() {
	let h = super::harness(HarnessOptions { email: SendMode::Unavailable, ..Default::default() });
	let first = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(first.outcome, Some(RunOutcome::PartialFailure));
	assert_eq!(first.counts.delivery_failed_retryable, 1);
	assert_eq!(h.email.attempts.load(Ordering::SeqCst), 3);
	assert_eq!(h.store.deliveries()[0].status, DeliveryStatus::FailedRetryable);

	h.email.set_mode(SendMode::Accept);

	let second = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(second.outcome, Some(RunOutcome::Success));
	assert_eq!(second.counts.notified, 1);
	assert_eq!(h.email.sent_keys().len(), 1);
	assert_eq!(h.telegram.sent_keys().len(), 1);
	assert_eq!(h.store.deliveries()[0].status, DeliveryStatus::Sent);
	assert_eq!(h.store.deliveries()[0].attempt_count, 4);
}

#[tokio::test]
async fn store_failure_for_one_event_leaves_the_others_committed() {
	let h = super::harness(HarnessOptions { page: two_events(), ..Default::default() });
	let pydata_key = herald_domain::EventDraft {
		title: "PyData Meetup".to_string(),
		start_time: super::upcoming(30),
		end_time: None,
		location: None,
		source_url: "https://datatalk.cz/akce/pydata-meetup".to_string(),
		description: None,
	}
	.identity_key();

	h.store.fail_upserts_for(&pydata_key);

	let first = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(first.outcome, Some(RunOutcome::PartialFailure));
	assert_eq!(first.counts.commit_failed, 1);
	assert!(first.errors.iter().any(|err| err.stage == RunStage::Commit
		&& err.identity_key.as_deref() == Some(pydata_key.as_str())));
	assert_eq!(h.store.events().len(), 1);
	assert_eq!(h.email.sent_keys().len(), 1);

	h.store.clear_failures();

	let second = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(second.outcome, Some(RunOutcome::Success));
	assert_eq!(second.counts.new, 1);
	assert_eq!(second.counts.unchanged, 1);
	assert_eq!(h.email.sent_keys().len(), 2);
	assert!(h.email.sent_keys().contains(&pydata_key));
}

#[tokio::test]
async fn fetch_failure_fails_the_run_without_commits() {
	let h = super::harness(HarnessOptions::default());

	*h.fetcher.page.lock().expect("Failed to lock page.") = None;

	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(run.outcome, Some(RunOutcome::Failed));
	assert!(run.fetch_failed);
	assert_eq!(run.errors[0].stage, RunStage::Fetch);
	assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
	assert!(h.store.events().is_empty());
	assert_eq!(h.store.runs().len(), 1);
	assert!(h.store.runs()[0].is_finished());
}

#[tokio::test]
async fn malformed_cards_are_reported_without_failing_the_run() {
	let mut page = super::listing(&[super::pydata("Prague")]);

	page = page.replace(
		"</main>",
		r#"<article class="event-card"><h2>No link here</h2><time datetime="2030-01-01">x</time></article></main>"#,
	);

	let h = super::harness(HarnessOptions { page, ..Default::default() });
	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert_eq!(run.counts.malformed, 1);
	assert_eq!(run.counts.new, 1);
	assert!(run.errors.iter().any(|err| err.stage == RunStage::Extract));
	assert_eq!(h.store.events().len(), 1);
}
