use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as RunLock, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::Pipeline;
use herald_domain::{PipelineRun, RunTrigger};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
	Started,
	/// A run is active. This trigger runs right after it, unless another is already waiting.
	Queued,
	Dropped,
}
impl TriggerOutcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Started => "started",
			Self::Queued => "queued",
			Self::Dropped => "dropped",
		}
	}
}

struct Inner {
	pipeline: Arc<Pipeline>,
	run_lock: Arc<RunLock<()>>,
	pending: Mutex<Option<RunTrigger>>,
	current: Mutex<Option<CancellationToken>>,
	queue_when_busy: bool,
	shutdown: CancellationToken,
}
impl Inner {
	fn pending(&self) -> MutexGuard<'_, Option<RunTrigger>> {
		self.pending.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn current(&self) -> MutexGuard<'_, Option<CancellationToken>> {
		self.current.lock().unwrap_or_else(|err| err.into_inner())
	}

	async fn run_once(&self, trigger: RunTrigger) -> PipelineRun {
		let cancel = self.shutdown.child_token();

		*self.current() = Some(cancel.clone());

		let run = self.pipeline.run(trigger, cancel).await;

		*self.current() = None;

		run
	}

	/// Runs `trigger` and then whatever got queued behind it. The run lock is held throughout
	/// and released on every exit, unwinding included.
	async fn drive(self: Arc<Self>, mut guard: OwnedMutexGuard<()>, mut trigger: RunTrigger) {
		loop {
			self.run_once(trigger).await;

			let queued = self.pending().take();

			trigger = match queued {
				Some(next) => next,
				None => {
					drop(guard);

					// A trigger may have queued itself between the check above and the release.
					if self.pending().is_none() {
						return;
					}

					let Ok(relocked) = self.run_lock.clone().try_lock_owned() else {
						return;
					};

					guard = relocked;

					match self.pending().take() {
						Some(next) => next,
						None => return,
					}
				},
			};

			if self.shutdown.is_cancelled() {
				return;
			}
		}
	}
}

/// Owns the run lock. At most one pipeline run is active at a time; triggers that arrive while
/// one is active are queued (at most one waits) or dropped.
#[derive(Clone)]
pub struct RunCoordinator {
	inner: Arc<Inner>,
}
impl RunCoordinator {
	pub fn new(pipeline: Arc<Pipeline>, queue_when_busy: bool) -> Self {
		Self {
			inner: Arc::new(Inner {
				pipeline,
				run_lock: Arc::new(RunLock::new(())),
				pending: Mutex::new(None),
				current: Mutex::new(None),
				queue_when_busy,
				shutdown: CancellationToken::new(),
			}),
		}
	}

	pub fn pipeline(&self) -> &Arc<Pipeline> {
		&self.inner.pipeline
	}

	pub fn is_running(&self) -> bool {
		self.inner.run_lock.try_lock().is_err()
	}

	/// Starts a run in the background, or queues or drops it when one is already active.
	pub fn trigger(&self, trigger: RunTrigger) -> TriggerOutcome {
		let inner = &self.inner;

		if inner.shutdown.is_cancelled() {
			return TriggerOutcome::Dropped;
		}
		if let Ok(guard) = inner.run_lock.clone().try_lock_owned() {
			tokio::spawn(inner.clone().drive(guard, trigger));

			return TriggerOutcome::Started;
		}
		if !inner.queue_when_busy {
			tracing::info!(trigger = trigger.as_str(), "Run already active. Dropping trigger.");

			return TriggerOutcome::Dropped;
		}

		{
			let mut pending = inner.pending();

			if pending.is_some() {
				tracing::info!(
					trigger = trigger.as_str(),
					"Run already active and another is queued. Dropping trigger."
				);

				return TriggerOutcome::Dropped;
			}

			*pending = Some(trigger);
		}

		// The active run may have finished between the lock attempt and the enqueue.
		if let Ok(guard) = inner.run_lock.clone().try_lock_owned() {
			if let Some(queued) = inner.pending().take() {
				tokio::spawn(inner.clone().drive(guard, queued));
			}

			return TriggerOutcome::Started;
		}

		tracing::info!(trigger = trigger.as_str(), "Run already active. Queued trigger.");

		TriggerOutcome::Queued
	}

	/// Waits for the run lock, runs once, and returns the finished run. `None` after shutdown.
	pub async fn run_now(&self, trigger: RunTrigger) -> Option<PipelineRun> {
		let inner = &self.inner;
		let guard = tokio::select! {
			biased;

			_ = inner.shutdown.cancelled() => return None,
			guard = inner.run_lock.clone().lock_owned() => guard,
		};
		let run = inner.run_once(trigger).await;

		if let Some(queued) = inner.pending().take() {
			tokio::spawn(inner.clone().drive(guard, queued));
		}

		Some(run)
	}

	/// Asks the active run, if any, to stop at the next event boundary.
	pub fn cancel_current(&self) -> bool {
		match self.inner.current().as_ref() {
			Some(token) => {
				token.cancel();

				true
			},
			None => false,
		}
	}

	/// Returns once no run is active and none is queued.
	pub async fn wait_idle(&self) {
		let inner = &self.inner;

		loop {
			let guard = inner.run_lock.clone().lock_owned().await;
			let queued = inner.pending().take();

			match queued {
				Some(trigger) if !inner.shutdown.is_cancelled() => {
					tokio::spawn(inner.clone().drive(guard, trigger));
				},
				_ => return,
			}
		}
	}

	/// Refuses new triggers, discards the queued one, cancels the active run, and waits for it.
	pub async fn shutdown(&self) {
		self.inner.shutdown.cancel();
		self.inner.pending().take();
		self.wait_idle().await;
	}
}

/// Accepts five-field cron expressions by prepending a zero seconds field. Six and seven
/// field expressions pass through.
pub fn cron_expression(raw: &str) -> String {
	let fields = raw.split_whitespace().collect::<Vec<_>>();

	if fields.len() == 5 { format!("0 {}", fields.join(" ")) } else { fields.join(" ") }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn five_field_cron_gets_a_seconds_field() {
		assert_eq!(cron_expression("0 8 * * 1"), "0 0 8 * * 1");
		assert_eq!(cron_expression("  */5  * * * *"), "0 */5 * * * *");
		assert_eq!(cron_expression("0 0 8 * * Mon"), "0 0 8 * * Mon");
	}

	#[test]
	fn trigger_outcomes_have_stable_names() {
		assert_eq!(TriggerOutcome::Started.as_str(), "started");
		assert_eq!(TriggerOutcome::Queued.as_str(), "queued");
		assert_eq!(TriggerOutcome::Dropped.as_str(), "dropped");
	}
}
