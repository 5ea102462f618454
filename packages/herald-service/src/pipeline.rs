use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
	time::Duration,
};

use futures::{StreamExt, stream};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::{
	Channel, DeliveryOutcome, Enricher, EventDetail, Extractor, FetchError, Providers, Result,
	dispatcher::{DispatchItem, DispatchReport, Dispatcher},
	enrichment::EnrichmentOutcome,
	retry,
};
use herald_config::{Config, Details, Enrichment, LlmProviderConfig, Source};
use herald_domain::{
	Classification, Event, LocalZone, PipelineRun, RetryPolicy, RunStage, RunTrigger,
	diff::{self, Classified},
	identity,
};
use herald_storage::EventStore;

/// Everything a run needs from the configuration.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
	pub source: Source,
	pub enrichment: Enrichment,
	pub details: Details,
	pub llm_summary: Option<LlmProviderConfig>,
	pub delivery_retry: RetryPolicy,
	pub notify_past_events: bool,
}
impl PipelineSettings {
	pub fn from_config(cfg: &Config) -> Self {
		Self {
			source: cfg.source.clone(),
			enrichment: cfg.enrichment.clone(),
			details: cfg.details.clone(),
			llm_summary: cfg.providers.llm_summary.clone(),
			delivery_retry: retry::policy_from_config(&cfg.delivery.retry),
			notify_past_events: cfg.delivery.notify_past_events,
		}
	}
}

pub struct Pipeline {
	settings: PipelineSettings,
	store: Arc<dyn EventStore>,
	providers: Providers,
	channels: Vec<Channel>,
	extractor: Extractor,
	enricher: Enricher,
	dispatcher: Dispatcher,
}
impl Pipeline {
	/// `channels` are the enabled channels. Records owed to any other channel are left alone.
	pub fn new(
		settings: PipelineSettings,
		store: Arc<dyn EventStore>,
		providers: Providers,
		channels: Vec<Channel>,
	) -> Result<Self> {
		let enricher = Enricher::new(
			providers.summary.clone(),
			settings.llm_summary.clone(),
			&settings.enrichment,
		);
		let dispatcher = Dispatcher::new(store.clone(), settings.delivery_retry);
		let zone = LocalZone::new(settings.source.utc_offset, settings.source.eu_summer_time);

		Ok(Self {
			settings,
			store,
			providers,
			channels,
			extractor: Extractor::new(zone)?,
			enricher,
			dispatcher,
		})
	}

	pub fn store(&self) -> &Arc<dyn EventStore> {
		&self.store
	}

	/// Executes one run end to end and returns its finalized record. Never fails: every error
	/// is attached to the returned run.
	pub async fn run(&self, trigger: RunTrigger, cancel: CancellationToken) -> PipelineRun {
		let mut run = PipelineRun::start(trigger, OffsetDateTime::now_utc());

		tracing::info!(run_id = %run.run_id, trigger = trigger.as_str(), "Pipeline run started.");

		if let Err(err) = self.store.create_run(&run).await {
			tracing::error!(run_id = %run.run_id, error = %err, "Failed to record run start.");

			run.counts.store_errors += 1;

			run.push_error(RunStage::Commit, retry::sanitize_error(&err.to_string()));
		}

		let dispatch = self.execute(&mut run, &cancel).await;

		self.finish(run, &dispatch).await
	}

	async fn execute(&self, run: &mut PipelineRun, cancel: &CancellationToken) -> DispatchReport {
		let raw = match self.fetch().await {
			Ok(raw) => raw,
			Err(err) => {
				tracing::error!(
					run_id = %run.run_id,
					url = %self.settings.source.url,
					kind = err.kind(),
					error = %err,
					"Source fetch failed. Aborting run."
				);

				run.fetch_failed = true;

				run.push_error(RunStage::Fetch, retry::sanitize_error(&err.to_string()));

				return DispatchReport::default();
			},
		};
		let drafts = match self.extractor.extract(&raw, &self.settings.source.url) {
			Ok(drafts) => drafts,
			Err(partial) => {
				for fragment in &partial.malformed {
					tracing::warn!(
						run_id = %run.run_id,
						reason = %fragment.reason,
						snippet = %fragment.snippet,
						"Skipping malformed record."
					);

					run.counts.malformed += 1;

					run.push_error(
						RunStage::Extract,
						format!("{} Fragment: {}", fragment.reason, fragment.snippet),
					);
				}

				partial.drafts
			},
		};
		let (candidates, duplicates) = diff::dedupe_batch(drafts);

		if duplicates > 0 {
			tracing::debug!(run_id = %run.run_id, duplicates, "Collapsed duplicate drafts.");
		}

		run.counts.seen = candidates.len() as u32;

		let keys = candidates.iter().map(|candidate| candidate.identity_key.clone()).collect::<Vec<_>>();
		let stored = match self.store.get_many(&keys).await {
			Ok(stored) => Some(stored),
			Err(err) => {
				tracing::error!(run_id = %run.run_id, error = %err, "Failed to look up stored events.");

				run.counts.commit_failed += candidates.len() as u32;

				run.push_error(RunStage::Lookup, retry::sanitize_error(&err.to_string()));

				None
			},
		};

		if let Some(stored) = stored {
			let classified = diff::diff(candidates, &stored);

			self.commit(run, classified, &stored, cancel).await;
		}

		if cancel.is_cancelled() {
			run.cancelled = true;

			return DispatchReport::default();
		}

		let items = self.outstanding(run).await;

		self.dispatcher.dispatch(&items, &self.channels, cancel).await
	}

	async fn fetch(&self) -> std::result::Result<String, FetchError> {
		let source = &self.settings.source;
		let policy = retry::policy_from_config(&source.retry);
		// Slack over the client's own timeout so a stalled provider still gets cut off.
		let bound = Duration::from_millis(source.timeout_ms.saturating_mul(2));
		let attempted = retry::with_retry(&policy, FetchError::is_retryable, || async {
			match tokio::time::timeout(bound, self.providers.fetcher.fetch(source)).await {
				Ok(result) => result,
				Err(_) => Err(FetchError::Timeout {
					url: source.url.clone(),
					timeout_ms: source.timeout_ms,
				}),
			}
		})
		.await;

		attempted.result
	}

	async fn commit(
		&self,
		run: &mut PipelineRun,
		classified: Vec<Classified>,
		stored: &HashMap<String, Event>,
		cancel: &CancellationToken,
	) {
		let channel_names = self.channels.iter().map(|channel| channel.name.clone()).collect::<Vec<_>>();
		let details = self.details(run, &classified).await;

		for Classified { candidate, classification } in classified {
			if cancel.is_cancelled() {
				tracing::info!(run_id = %run.run_id, "Run cancelled. Stopping before the next event.");

				run.cancelled = true;

				run.push_error(RunStage::Cancel, "Run cancelled before all events were committed.");

				return;
			}

			let previous = stored.get(&candidate.identity_key);
			let now = OffsetDateTime::now_utc();
			let identity_key = candidate.identity_key.clone();

			match classification {
				Classification::Unchanged => run.counts.unchanged += 1,
				Classification::New => run.counts.new += 1,
				Classification::Changed => run.counts.changed += 1,
			}

			let (event, pending) = if classification.is_notifiable() {
				let detail = details.get(&identity_key);
				let summary = match self.enricher.enrich(&candidate.draft, detail).await {
					EnrichmentOutcome::Summarized(summary) => Some(summary),
					EnrichmentOutcome::Disabled => None,
					EnrichmentOutcome::Degraded { error, attempts } => {
						tracing::warn!(
							run_id = %run.run_id,
							identity_key = %identity_key,
							attempts,
							error = %error,
							"Summary enrichment degraded."
						);

						run.counts.enrichment_degraded += 1;

						run.push_event_error(RunStage::Enrich, &identity_key, error);

						None
					},
				};
				let event = Event::observe(
					candidate.draft,
					candidate.identity_key,
					candidate.content_hash,
					summary,
					previous,
					now,
				);
				let pending = if event.has_started(now) && !self.settings.notify_past_events {
					run.counts.past_events += 1;

					Vec::new()
				} else {
					channel_names.clone()
				};

				(event, pending)
			} else {
				let summary = previous.and_then(|event| event.summary.clone());
				let event = Event::observe(
					candidate.draft,
					candidate.identity_key,
					candidate.content_hash,
					summary,
					previous,
					now,
				);

				(event, Vec::new())
			};

			match self.store.upsert(&event, &pending).await {
				Ok(committed) => {
					tracing::debug!(
						run_id = %run.run_id,
						identity_key = %identity_key,
						classification = committed.as_str(),
						pending = pending.len(),
						"Committed event."
					);
				},
				Err(err) => {
					tracing::error!(
						run_id = %run.run_id,
						identity_key = %identity_key,
						error = %err,
						"Failed to commit event. It will be seen again next run."
					);

					run.counts.commit_failed += 1;

					run.push_event_error(
						RunStage::Commit,
						&identity_key,
						retry::sanitize_error(&err.to_string()),
					);
				},
			}
		}
	}

	/// Reads the pages of new and changed events so enrichment sees more than the listing card.
	/// A page that cannot be fetched leaves that event with its card text only.
	async fn details(
		&self,
		run: &PipelineRun,
		classified: &[Classified],
	) -> HashMap<String, EventDetail> {
		let cfg = &self.settings.details;

		if !cfg.enabled || !self.enricher.is_enabled() {
			return HashMap::new();
		}

		let source = &self.settings.source;
		let listing = identity::normalize_url(&source.url);
		let bound = Duration::from_millis(cfg.timeout_ms.saturating_mul(2));
		let requests = classified
			.iter()
			.filter(|classified| classified.classification.is_notifiable())
			.map(|classified| &classified.candidate)
			.filter(|candidate| identity::normalize_url(&candidate.draft.source_url) != listing)
			.map(|candidate| async move {
				let url = candidate.draft.source_url.as_str();
				let fetch = self.providers.fetcher.fetch_detail(url, source, cfg.timeout_ms);
				let result = match tokio::time::timeout(bound, fetch).await {
					Ok(result) => result,
					Err(_) => Err(FetchError::Timeout { url: url.to_string(), timeout_ms: cfg.timeout_ms }),
				};

				(candidate.identity_key.as_str(), url, result)
			})
			.collect::<Vec<_>>();
		let fetched = stream::iter(requests).buffer_unordered(cfg.concurrency).collect::<Vec<_>>().await;
		let mut details = HashMap::with_capacity(fetched.len());

		for (identity_key, url, result) in fetched {
			match result {
				Ok(raw) => {
					let detail = self.extractor.detail(&raw);

					if !detail.is_empty() {
						details.insert(identity_key.to_string(), detail);
					}
				},
				Err(err) => {
					tracing::warn!(
						run_id = %run.run_id,
						identity_key,
						url,
						kind = err.kind(),
						error = %err,
						"Detail page fetch failed. Enriching from the listing card."
					);
				},
			}
		}

		details
	}

	/// Current versions that still owe a delivery on an enabled channel, including versions
	/// committed by an earlier run that never finished dispatching.
	async fn outstanding(&self, run: &mut PipelineRun) -> Vec<DispatchItem> {
		let records = match self.store.outstanding_deliveries().await {
			Ok(records) => records,
			Err(err) => {
				tracing::error!(run_id = %run.run_id, error = %err, "Failed to load outstanding deliveries.");

				run.counts.store_errors += 1;

				run.push_error(RunStage::Deliver, retry::sanitize_error(&err.to_string()));

				return Vec::new();
			},
		};
		let mut grouped = BTreeMap::<String, Vec<_>>::new();

		for record in records {
			if self.channels.iter().any(|channel| channel.name == record.channel) {
				grouped.entry(record.identity_key.clone()).or_default().push(record);
			}
		}

		let mut items = Vec::with_capacity(grouped.len());

		for (identity_key, records) in grouped {
			match self.store.get_by_identity(&identity_key).await {
				Ok(Some(event)) => items.push(DispatchItem { event: Arc::new(event), records }),
				Ok(None) => {
					tracing::warn!(
						run_id = %run.run_id,
						identity_key = %identity_key,
						"Outstanding deliveries reference a missing event."
					);
				},
				Err(err) => {
					run.counts.store_errors += 1;

					run.push_event_error(
						RunStage::Deliver,
						&identity_key,
						retry::sanitize_error(&err.to_string()),
					);
				},
			}
		}

		items.sort_by(|a, b| {
			a.event
				.start_time
				.cmp(&b.event.start_time)
				.then_with(|| a.event.identity_key.cmp(&b.event.identity_key))
		});

		items
	}

	async fn finish(&self, mut run: PipelineRun, dispatch: &DispatchReport) -> PipelineRun {
		dispatch.apply(&mut run);
		run.finalize(OffsetDateTime::now_utc());

		if let Err(err) = self.store.finish_run(&run).await {
			tracing::error!(run_id = %run.run_id, error = %err, "Failed to record run result.");
		}

		log_summary(&run, dispatch);

		run
	}
}

fn log_summary(run: &PipelineRun, dispatch: &DispatchReport) {
	let counts = &run.counts;
	let outcome = run.outcome.map(|outcome| outcome.as_str()).unwrap_or("unknown");

	for report in &dispatch.channels {
		tracing::info!(
			run_id = %run.run_id,
			channel = %report.channel,
			sent = report.count(DeliveryOutcome::Sent),
			skipped = report.count(DeliveryOutcome::Skipped),
			failed_permanent = report.count(DeliveryOutcome::FailedPermanent),
			failed_retryable = report.count(DeliveryOutcome::FailedRetryable),
			store_errors = report.store_errors.len(),
			cancelled = report.cancelled,
			"Channel dispatch finished."
		);
	}

	tracing::info!(
		run_id = %run.run_id,
		trigger = run.trigger.as_str(),
		outcome,
		seen = counts.seen,
		new = counts.new,
		changed = counts.changed,
		unchanged = counts.unchanged,
		malformed = counts.malformed,
		enrichment_degraded = counts.enrichment_degraded,
		commit_failed = counts.commit_failed,
		past_events = counts.past_events,
		store_errors = counts.store_errors,
		notified = counts.notified,
		delivery_skipped = counts.delivery_skipped,
		delivery_failed_permanent = counts.delivery_failed_permanent,
		delivery_failed_retryable = counts.delivery_failed_retryable,
		errors = run.errors.len(),
		cancelled = run.cancelled,
		"Pipeline run finished."
	);
}
