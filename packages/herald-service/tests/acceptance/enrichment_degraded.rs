use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use herald_domain::{RunOutcome, RunStage, RunTrigger};

use super::{HarnessOptions, SummaryMode};

#[tokio::test]
async fn enrichment_timeout_still_stores_and_notifies() {
	let h = super::harness(HarnessOptions { summary: Some(SummaryMode::Hang), ..Default::default() });
	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;
	let event = h.store.events().pop().expect("Event was not stored.");

	assert_eq!(event.summary, None);
	assert_eq!(run.counts.enrichment_degraded, 1);
	assert_eq!(run.counts.notified, 2);
	assert_eq!(run.outcome, Some(RunOutcome::PartialFailure));
	assert!(run.errors.iter().any(|err| err.stage == RunStage::Enrich
		&& err.identity_key.as_deref() == Some(event.identity_key.as_str())));
	// Timeouts are retryable, so the bound of two attempts is used up.
	assert_eq!(h.summary.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejected_summary_request_is_not_retried() {
	let h =
		super::harness(HarnessOptions { summary: Some(SummaryMode::Reject), ..Default::default() });
	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(run.counts.enrichment_degraded, 1);
	assert_eq!(h.summary.calls.load(Ordering::SeqCst), 1);
	assert_eq!(h.email.sent_keys().len(), 1);
}

#[tokio::test]
async fn missing_summary_provider_disables_enrichment_without_degrading() {
	let h = super::harness(HarnessOptions { summary: None, ..Default::default() });
	let run = h.pipeline.run(RunTrigger::Schedule, CancellationToken::new()).await;

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert_eq!(run.counts.enrichment_degraded, 0);
	assert_eq!(h.summary.calls.load(Ordering::SeqCst), 0);
	assert_eq!(h.store.events().pop().and_then(|event| event.summary), None);
}
