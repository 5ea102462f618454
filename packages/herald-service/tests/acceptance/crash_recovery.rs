use std::sync::Arc;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use herald_domain::{DeliveryStatus, Event, EventDraft, RunTrigger};
use herald_storage::{EventStore, MemoryStore};

use super::HarnessOptions;

/// The state a run leaves behind when it dies between commit and dispatch.
async fn committed_but_undelivered(channels: &[&str]) -> Arc<MemoryStore> {
	let store = Arc::new(MemoryStore::new());
	let draft = EventDraft {
		title: "PyData Meetup".to_string(),
		start_time: super::upcoming(30),
		end_time: None,
		location: Some("Prague".to_string()),
		source_url: "https://datatalk.cz/akce/pydata-meetup".to_string(),
		description: Some("Talks and pizza.".to_string()),
	};
	let event = Event::observe(
		draft.clone(),
		draft.identity_key(),
		draft.content_hash(),
		None,
		None,
		OffsetDateTime::now_utc(),
	);
	let channels = channels.iter().map(|channel| channel.to_string()).collect::<Vec<_>>();

	store.upsert(&event, &channels).await.expect("Failed to seed event.");

	store
}

#[tokio::test]
async fn rerun_after_crash_sends_exactly_once() {
	let store = committed_but_undelivered(&["email", "telegram"]).await;
	let h = super::harness_with_store(HarnessOptions::default(), store);
	let recovery = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(recovery.counts.unchanged, 1);
	assert_eq!(recovery.counts.notified, 2);
	assert_eq!(h.email.sent_keys().len(), 1);
	assert_eq!(h.telegram.sent_keys().len(), 1);

	let again = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(again.counts.notified, 0);
	assert_eq!(h.email.sent_keys().len(), 1);
	assert_eq!(h.telegram.sent_keys().len(), 1);
}

#[tokio::test]
async fn records_for_channels_no_longer_enabled_are_left_alone() {
	let store = committed_but_undelivered(&["email", "sms"]).await;
	let h = super::harness_with_store(HarnessOptions::default(), store);
	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(run.counts.notified, 1);
	assert_eq!(
		super::statuses(&h.store),
		vec![("email".to_string(), DeliveryStatus::Sent), ("sms".to_string(), DeliveryStatus::Pending)]
	);
	assert!(h.telegram.sent_keys().is_empty());
}
