use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
	Schedule,
	Manual,
}
impl RunTrigger {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Schedule => "schedule",
			Self::Manual => "manual",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"schedule" => Some(Self::Schedule),
			"manual" => Some(Self::Manual),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
	Success,
	PartialFailure,
	Failed,
}
impl RunOutcome {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::PartialFailure => "partial_failure",
			Self::Failed => "failed",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"success" => Some(Self::Success),
			"partial_failure" => Some(Self::PartialFailure),
			"failed" => Some(Self::Failed),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
	Fetch,
	Extract,
	Lookup,
	Enrich,
	Commit,
	Deliver,
	Cancel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
	pub stage: RunStage,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub identity_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub channel: Option<String>,
	pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCounts {
	pub seen: u32,
	pub new: u32,
	pub changed: u32,
	pub unchanged: u32,
	pub malformed: u32,
	pub enrichment_degraded: u32,
	pub commit_failed: u32,
	/// New or changed events that had already started and were stored without notifying.
	pub past_events: u32,
	/// Store failures outside event commits: lookups, run bookkeeping, delivery records.
	pub store_errors: u32,
	pub notified: u32,
	pub delivery_skipped: u32,
	pub delivery_failed_permanent: u32,
	pub delivery_failed_retryable: u32,
}

/// One execution of the pipeline. Created when a trigger is accepted, mutated only by the run
/// that owns it, and finalized exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
	pub run_id: Uuid,
	pub trigger: RunTrigger,
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339::option")]
	pub finished_at: Option<OffsetDateTime>,
	pub outcome: Option<RunOutcome>,
	pub counts: RunCounts,
	pub errors: Vec<RunError>,
	#[serde(default)]
	pub fetch_failed: bool,
	#[serde(default)]
	pub cancelled: bool,
}
impl PipelineRun {
	pub fn start(trigger: RunTrigger, started_at: OffsetDateTime) -> Self {
		Self {
			run_id: Uuid::new_v4(),
			trigger,
			started_at,
			finished_at: None,
			outcome: None,
			counts: RunCounts::default(),
			errors: Vec::new(),
			fetch_failed: false,
			cancelled: false,
		}
	}

	pub fn is_finished(&self) -> bool {
		self.finished_at.is_some()
	}

	pub fn push_error(&mut self, stage: RunStage, message: impl Into<String>) {
		self.errors.push(RunError {
			stage,
			identity_key: None,
			channel: None,
			message: message.into(),
		});
	}

	pub fn push_event_error(&mut self, stage: RunStage, identity_key: &str, message: impl Into<String>) {
		self.errors.push(RunError {
			stage,
			identity_key: Some(identity_key.to_string()),
			channel: None,
			message: message.into(),
		});
	}

	pub fn push_delivery_error(
		&mut self,
		identity_key: &str,
		channel: &str,
		message: impl Into<String>,
	) {
		self.errors.push(RunError {
			stage: RunStage::Deliver,
			identity_key: Some(identity_key.to_string()),
			channel: Some(channel.to_string()),
			message: message.into(),
		});
	}

	/// The outcome the run would finish with given what has been recorded so far.
	pub fn evaluate(&self) -> RunOutcome {
		if self.fetch_failed {
			return RunOutcome::Failed;
		}

		let counts = &self.counts;

		if self.cancelled
			|| counts.commit_failed > 0
			|| counts.store_errors > 0
			|| counts.enrichment_degraded > 0
			|| counts.delivery_failed_retryable > 0
		{
			return RunOutcome::PartialFailure;
		}

		RunOutcome::Success
	}

	/// Stamps the outcome and finish time. Returns `false` without touching anything when the
	/// run was already finalized.
	pub fn finalize(&mut self, finished_at: OffsetDateTime) -> bool {
		if self.is_finished() {
			return false;
		}

		self.outcome = Some(self.evaluate());
		self.finished_at = Some(finished_at);

		true
	}
}
