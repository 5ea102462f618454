use std::{sync::Arc, time::Duration};

use crate::{EventDetail, SummaryProvider, retry};
use herald_config::{Enrichment, LlmProviderConfig};
use herald_domain::{EventDraft, RetryPolicy};
use herald_providers::message;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EnrichmentError {
	pub message: String,
	pub retryable: bool,
}
impl EnrichmentError {
	pub fn timeout(timeout_ms: u64) -> Self {
		Self { message: format!("Summary request timed out after {timeout_ms} ms."), retryable: true }
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnrichmentOutcome {
	Summarized(String),
	/// No summary provider is configured.
	Disabled,
	Degraded { error: String, attempts: u32 },
}

/// Summary stage of extraction. Only ever called for new or changed drafts.
#[derive(Clone)]
pub struct Enricher {
	provider: Arc<dyn SummaryProvider>,
	cfg: Option<LlmProviderConfig>,
	policy: RetryPolicy,
	max_input_chars: usize,
}
impl Enricher {
	pub fn new(
		provider: Arc<dyn SummaryProvider>,
		cfg: Option<LlmProviderConfig>,
		enrichment: &Enrichment,
	) -> Self {
		Self {
			provider,
			cfg,
			policy: retry::policy_from_config(&enrichment.retry),
			max_input_chars: enrichment.max_input_chars,
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.cfg.is_some()
	}

	pub async fn enrich(
		&self,
		draft: &EventDraft,
		detail: Option<&EventDetail>,
	) -> EnrichmentOutcome {
		let Some(cfg) = self.cfg.as_ref() else {
			return EnrichmentOutcome::Disabled;
		};
		let input = event_text(draft, detail, self.max_input_chars);
		let timeout = Duration::from_millis(cfg.timeout_ms);
		let attempted = retry::with_retry(
			&self.policy,
			|err: &EnrichmentError| err.retryable,
			|| async {
				match tokio::time::timeout(timeout, self.provider.summarize(cfg, &input)).await {
					Ok(result) => result,
					Err(_) => Err(EnrichmentError::timeout(cfg.timeout_ms)),
				}
			},
		)
		.await;

		match attempted.result {
			Ok(summary) => EnrichmentOutcome::Summarized(summary),
			Err(err) => EnrichmentOutcome::Degraded {
				error: retry::sanitize_error(&err.message),
				attempts: attempted.attempts,
			},
		}
	}
}

/// Plain-text description of a draft for the summary model, capped at `max_chars`. Text from
/// the event's own page follows the card.
pub fn event_text(draft: &EventDraft, detail: Option<&EventDetail>, max_chars: usize) -> String {
	let mut text = format!(
		"Title: {}\nWhen: {}\nWhere: {}\nLink: {}",
		draft.title,
		message::display_time(draft.start_time),
		draft.location.as_deref().unwrap_or("TBD"),
		draft.source_url,
	);

	if let Some(description) = draft.description.as_deref() {
		text.push_str("\nDetails: ");
		text.push_str(description);
	}

	if let Some(detail) = detail {
		let summary = detail
			.description
			.as_deref()
			.or_else(|| detail.open_graph.get("og:description").map(String::as_str));
		let lines = [
			("Page title", detail.open_graph.get("og:title").map(String::as_str)),
			("Page summary", summary),
			("Page text", Some(detail.body.as_str()).filter(|body| !body.is_empty())),
		];

		for (label, value) in lines {
			if let Some(value) = value {
				text.push_str(&format!("\n{label}: {value}"));
			}
		}
	}

	text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn draft() -> EventDraft {
		EventDraft {
			title: "PyData Prague".into(),
			start_time: datetime!(2025-03-01 17:00 UTC),
			end_time: None,
			location: None,
			source_url: "https://datatalk.cz/akce/pydata".into(),
			description: Some("Talks.".into()),
		}
	}

	#[test]
	fn card_text_alone_without_a_detail_page() {
		let text = event_text(&draft(), None, 1_000);

		assert!(text.starts_with("Title: PyData Prague\n"));
		assert!(text.ends_with("\nDetails: Talks."));
		assert!(text.contains("Where: TBD"));
	}

	#[test]
	fn detail_page_text_follows_the_card() {
		let detail = EventDetail {
			description: None,
			open_graph: [
				("og:title".to_string(), "PyData Prague #42".to_string()),
				("og:description".to_string(), "Data talks.".to_string()),
			]
			.into(),
			body: "Doors open at 18:00.".into(),
		};
		let text = event_text(&draft(), Some(&detail), 1_000);

		assert!(text.ends_with(
			"\nDetails: Talks.\nPage title: PyData Prague #42\nPage summary: Data talks.\nPage text: Doors open at 18:00."
		));
		assert_eq!(event_text(&draft(), Some(&detail), 20).chars().count(), 20);
	}
}
