use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use herald_domain::{RunOutcome, RunTrigger};

use super::HarnessOptions;

const DETAIL_URL: &str = "https://datatalk.cz/akce/pydata-meetup";
const DETAIL_PAGE: &str = r#"
	<html><head>
		<meta property="og:title" content="PyData Prague #42">
	</head><body>
		<nav>Home Events Contact</nav>
		<main><p>Doors open at 17:30. Talks start at 18:00.</p></main>
	</body></html>
"#;

fn inputs(h: &super::Harness) -> Vec<String> {
	h.summary.inputs.lock().expect("Failed to lock inputs.").clone()
}

#[tokio::test]
async fn detail_page_text_reaches_the_summary_input() {
	let h = super::harness(HarnessOptions::default());

	h.fetcher.load_detail(DETAIL_URL, DETAIL_PAGE);

	let run = h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;
	let inputs = inputs(&h);

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert_eq!(h.fetcher.detail_calls.load(Ordering::SeqCst), 1);
	assert_eq!(inputs.len(), 1);
	assert!(inputs[0].contains("\nPage title: PyData Prague #42"));
	assert!(inputs[0].contains("\nPage text: Doors open at 17:30. Talks start at 18:00."));
	assert!(!inputs[0].contains("Home Events Contact"));
}

#[tokio::test]
async fn failed_detail_fetch_still_summarizes_and_notifies() {
	let h = super::harness(HarnessOptions::default());
	let run = h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;
	let inputs = inputs(&h);

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert!(run.errors.is_empty());
	assert_eq!(h.fetcher.detail_calls.load(Ordering::SeqCst), 1);
	assert!(inputs[0].ends_with("Details: Talks and pizza."));
	assert_eq!(h.email.sent_keys().len(), 1);
	assert_eq!(h.telegram.sent_keys().len(), 1);
}

#[tokio::test]
async fn unchanged_events_are_not_fetched_again() {
	let h = super::harness(HarnessOptions::default());

	h.fetcher.load_detail(DETAIL_URL, DETAIL_PAGE);
	h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;
	h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;

	assert_eq!(h.fetcher.detail_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn detail_pages_are_skipped_without_a_summary_provider() {
	let h = super::harness(HarnessOptions { summary: None, ..Default::default() });
	let run = h.pipeline.run(RunTrigger::Manual, CancellationToken::new()).await;

	assert_eq!(run.outcome, Some(RunOutcome::Success));
	assert_eq!(h.fetcher.detail_calls.load(Ordering::SeqCst), 0);
}
