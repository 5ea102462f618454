use std::{collections::HashMap, sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{Channel, DeliveryError, retry};
use herald_domain::{
	DeliveryRecord, DeliveryStatus, Event, PipelineRun, RetryPolicy, RunError, RunStage,
};
use herald_storage::EventStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
	Sent,
	/// The version was already settled on this channel by an earlier attempt.
	Skipped,
	FailedPermanent,
	FailedRetryable,
}
impl DeliveryOutcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Sent => "sent",
			Self::Skipped => "skipped",
			Self::FailedPermanent => "failed_permanent",
			Self::FailedRetryable => "failed_retryable",
		}
	}

	fn status(self) -> Option<DeliveryStatus> {
		match self {
			Self::Sent => Some(DeliveryStatus::Sent),
			Self::FailedPermanent => Some(DeliveryStatus::FailedPermanent),
			Self::FailedRetryable => Some(DeliveryStatus::FailedRetryable),
			Self::Skipped => None,
		}
	}
}

#[derive(Clone, Debug)]
pub struct DeliveryAttempt {
	pub identity_key: String,
	pub outcome: DeliveryOutcome,
	pub attempts: u32,
	pub error: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ChannelReport {
	pub channel: String,
	pub deliveries: Vec<DeliveryAttempt>,
	/// Failed reads or writes of delivery records, as `(identity_key, message)`.
	pub store_errors: Vec<(String, String)>,
	pub cancelled: bool,
	/// Set when the channel task died; its unsent records stay outstanding.
	pub task_error: Option<String>,
}
impl ChannelReport {
	pub fn count(&self, outcome: DeliveryOutcome) -> usize {
		self.deliveries.iter().filter(|delivery| delivery.outcome == outcome).count()
	}
}

#[derive(Clone, Debug, Default)]
pub struct DispatchReport {
	pub channels: Vec<ChannelReport>,
}
impl DispatchReport {
	/// Folds per-channel results into the run counters and error list.
	pub fn apply(&self, run: &mut PipelineRun) {
		for report in &self.channels {
			for delivery in &report.deliveries {
				match delivery.outcome {
					DeliveryOutcome::Sent => run.counts.notified += 1,
					DeliveryOutcome::Skipped => run.counts.delivery_skipped += 1,
					DeliveryOutcome::FailedPermanent => run.counts.delivery_failed_permanent += 1,
					DeliveryOutcome::FailedRetryable => run.counts.delivery_failed_retryable += 1,
				}

				if let Some(error) = delivery.error.as_deref() {
					run.push_delivery_error(&delivery.identity_key, &report.channel, error);
				}
			}
			for (identity_key, message) in &report.store_errors {
				run.counts.store_errors += 1;

				run.errors.push(RunError {
					stage: RunStage::Deliver,
					identity_key: Some(identity_key.clone()),
					channel: Some(report.channel.clone()),
					message: message.clone(),
				});
			}

			if report.cancelled {
				run.cancelled = true;
			}
			if let Some(error) = report.task_error.as_deref() {
				run.counts.delivery_failed_retryable += 1;

				run.errors.push(RunError {
					stage: RunStage::Deliver,
					identity_key: None,
					channel: Some(report.channel.clone()),
					message: error.to_string(),
				});
			}
		}
	}
}

/// Outstanding work for one event: its current version and the records still owed to it.
#[derive(Clone, Debug)]
pub struct DispatchItem {
	pub event: Arc<Event>,
	pub records: Vec<DeliveryRecord>,
}

pub struct Dispatcher {
	store: Arc<dyn EventStore>,
	policy: RetryPolicy,
}
impl Dispatcher {
	pub fn new(store: Arc<dyn EventStore>, policy: RetryPolicy) -> Self {
		Self { store, policy }
	}

	/// Sends every outstanding record on its channel. Channels run concurrently and in
	/// isolation; events within a channel go in order, with cancellation checked between them.
	pub async fn dispatch(
		&self,
		items: &[DispatchItem],
		channels: &[Channel],
		cancel: &CancellationToken,
	) -> DispatchReport {
		let mut tasks = JoinSet::new();
		let mut names = HashMap::new();

		for channel in channels {
			let queue = items
				.iter()
				.flat_map(|item| {
					item.records
						.iter()
						.filter(|record| record.channel == channel.name)
						.map(|record| (item.event.clone(), record.clone()))
				})
				.collect::<Vec<_>>();

			if queue.is_empty() {
				continue;
			}

			let handle = tasks.spawn(run_channel(
				self.store.clone(),
				channel.clone(),
				self.policy,
				queue,
				cancel.clone(),
			));

			names.insert(handle.id(), channel.name.clone());
		}

		let mut report = DispatchReport::default();

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(channel_report) => report.channels.push(channel_report),
				Err(err) => {
					let channel = names.get(&err.id()).cloned().unwrap_or_default();

					tracing::error!(channel = %channel, error = %err, "Channel dispatch task failed.");

					report.channels.push(ChannelReport {
						channel,
						task_error: Some(format!("Channel task failed: {err}.")),
						..Default::default()
					});
				},
			}
		}

		report.channels.sort_by(|a, b| a.channel.cmp(&b.channel));

		report
	}
}

async fn run_channel(
	store: Arc<dyn EventStore>,
	channel: Channel,
	policy: RetryPolicy,
	queue: Vec<(Arc<Event>, DeliveryRecord)>,
	cancel: CancellationToken,
) -> ChannelReport {
	let mut report = ChannelReport { channel: channel.name.clone(), ..Default::default() };

	for (event, mut record) in queue {
		if cancel.is_cancelled() {
			report.cancelled = true;

			break;
		}

		match store.get_delivery(&record.identity_key, &record.channel, &record.content_hash).await {
			Ok(Some(current)) if current.status.is_terminal() => {
				report.deliveries.push(DeliveryAttempt {
					identity_key: record.identity_key.clone(),
					outcome: DeliveryOutcome::Skipped,
					attempts: 0,
					error: None,
				});

				continue;
			},
			Ok(Some(current)) => record = current,
			Ok(None) => {},
			Err(err) => {
				// Without the current record a send could duplicate one already made.
				tracing::warn!(
					channel = %channel.name,
					identity_key = %record.identity_key,
					error = %err,
					"Failed to read delivery record. Leaving it for the next run."
				);
				report.store_errors.push((record.identity_key.clone(), err.to_string()));

				continue;
			},
		}

		let attempt = send(&channel, &policy, &event).await;

		if let Some(status) = attempt.outcome.status() {
			record.settle(status, attempt.attempts, OffsetDateTime::now_utc(), attempt.error.clone());
		}
		if let Err(err) = store.record_delivery(&record).await {
			tracing::error!(
				channel = %channel.name,
				identity_key = %record.identity_key,
				outcome = attempt.outcome.as_str(),
				error = %err,
				"Failed to record delivery."
			);
			report.store_errors.push((record.identity_key.clone(), err.to_string()));
		}

		report.deliveries.push(attempt);
	}

	report
}

async fn send(channel: &Channel, policy: &RetryPolicy, event: &Event) -> DeliveryAttempt {
	let timeout = Duration::from_millis(channel.timeout_ms);
	let attempted = retry::with_retry(policy, DeliveryError::is_retryable, || async {
		match tokio::time::timeout(timeout, channel.sender.send(&channel.target, event)).await {
			Ok(result) => result,
			Err(_) => Err(DeliveryError::retryable(format!(
				"Send timed out after {} ms.",
				channel.timeout_ms
			))),
		}
	})
	.await;
	let (outcome, error) = match attempted.result {
		Ok(()) => (DeliveryOutcome::Sent, None),
		Err(err) => {
			let outcome = if err.is_retryable() {
				DeliveryOutcome::FailedRetryable
			} else {
				DeliveryOutcome::FailedPermanent
			};

			tracing::warn!(
				channel = %channel.name,
				identity_key = %event.identity_key,
				attempts = attempted.attempts,
				outcome = outcome.as_str(),
				error = %err,
				"Delivery failed."
			);

			(outcome, Some(retry::sanitize_error(err.message())))
		},
	};

	DeliveryAttempt {
		identity_key: event.identity_key.clone(),
		outcome,
		attempts: attempted.attempts,
		error,
	}
}
