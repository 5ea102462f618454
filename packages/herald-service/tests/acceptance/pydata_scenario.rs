use std::sync::atomic::Ordering;

use time::macros::datetime;
use tokio_util::sync::CancellationToken;

use herald_domain::{DeliveryStatus, RunOutcome, RunTrigger};

use super::{Card, HarnessOptions};

fn meetup(location: &str) -> Card {
	Card {
		title: "PyData Meetup".to_string(),
		start: datetime!(2025-03-01 18:00 UTC),
		href: "/akce/pydata-meetup".to_string(),
		location: location.to_string(),
	}
}

fn options(location: &str) -> HarnessOptions {
	HarnessOptions { page: super::listing(&[meetup(location)]), ..Default::default() }
}

#[tokio::test]
async fn new_event_is_sent_once_per_channel() {
	let h = super::harness(options("Prague"));
	let run = h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert_eq!(run.counts.new, 1);
	assert_eq!(
		super::statuses(&h.store),
		vec![
			("email".to_string(), DeliveryStatus::Sent),
			("telegram".to_string(), DeliveryStatus::Sent),
		]
	);

	let event = h.store.events().pop().expect("Event was not stored.");

	assert_eq!(event.source_url, "https://datatalk.cz/akce/pydata-meetup");
	assert_eq!(event.start_time, datetime!(2025-03-01 18:00 UTC));
	assert_eq!(h.email.sent_keys(), vec![event.identity_key.clone()]);
	assert_eq!(h.telegram.sent_keys(), vec![event.identity_key]);
}

#[tokio::test]
async fn unchanged_refetch_creates_no_delivery_records() {
	let h = super::harness(options("Prague"));

	h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;

	let before = h.store.deliveries();
	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(run.counts.unchanged, 1);
	assert_eq!(h.store.deliveries(), before);
}

#[tokio::test]
async fn new_location_is_a_change_with_fresh_notifications() {
	let h = super::harness(options("Prague"));

	h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;

	let original = h.store.events().pop().expect("Event was not stored.");

	h.fetcher.load(super::listing(&[meetup("Brno")]));

	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;
	let changed = super::stored_event(&h.store, &original.identity_key).await;

	assert_eq!(run.counts.changed, 1);
	assert_eq!(run.counts.notified, 2);
	assert_ne!(changed.content_hash, original.content_hash);
	assert_eq!(changed.location.as_deref(), Some("Brno"));
	assert_eq!(changed.first_seen_at, original.first_seen_at);
	assert!(!changed.is_first_version());
	assert_eq!(h.summary.calls.load(Ordering::SeqCst), 2);
	assert_eq!(h.email.sent_keys().len(), 2);
	assert_eq!(h.telegram.sent_keys().len(), 2);
	assert_eq!(h.store.deliveries().len(), 4);
}

#[tokio::test]
async fn past_events_are_stored_without_notifying() {
	let h = super::harness(HarnessOptions { notify_past_events: false, ..options("Prague") });
	let run = h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert_eq!(run.counts.new, 1);
	assert_eq!(run.counts.past_events, 1);
	assert_eq!(h.store.events().len(), 1);
	assert!(h.store.deliveries().is_empty());
	assert!(h.email.sent_keys().is_empty());
}
