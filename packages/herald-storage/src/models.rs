use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result};
use herald_domain::{DeliveryRecord, DeliveryStatus, Event, PipelineRun, RunOutcome, RunTrigger};

#[derive(Debug, sqlx::FromRow)]
pub struct EventRow {
	pub identity_key: String,
	pub title: String,
	pub start_time: OffsetDateTime,
	pub end_time: Option<OffsetDateTime>,
	pub location: Option<String>,
	pub source_url: String,
	pub description: Option<String>,
	pub summary: Option<String>,
	pub content_hash: String,
	pub first_seen_at: OffsetDateTime,
	pub last_seen_at: OffsetDateTime,
	pub last_changed_at: OffsetDateTime,
}
impl From<EventRow> for Event {
	fn from(row: EventRow) -> Self {
		Self {
			identity_key: row.identity_key,
			title: row.title,
			start_time: row.start_time,
			end_time: row.end_time,
			location: row.location,
			source_url: row.source_url,
			description: row.description,
			summary: row.summary,
			content_hash: row.content_hash,
			first_seen_at: row.first_seen_at,
			last_seen_at: row.last_seen_at,
			last_changed_at: row.last_changed_at,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct DeliveryRow {
	pub identity_key: String,
	pub channel: String,
	pub content_hash: String,
	pub status: String,
	pub attempt_count: i32,
	pub last_attempt_at: Option<OffsetDateTime>,
	pub last_error: Option<String>,
}
impl TryFrom<DeliveryRow> for DeliveryRecord {
	type Error = Error;

	fn try_from(row: DeliveryRow) -> Result<Self> {
		let status: DeliveryStatus = row.status.parse().map_err(Error::Corrupt)?;

		Ok(Self {
			identity_key: row.identity_key,
			channel: row.channel,
			content_hash: row.content_hash,
			status,
			attempt_count: u32::try_from(row.attempt_count).unwrap_or_default(),
			last_attempt_at: row.last_attempt_at,
			last_error: row.last_error,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct RunRow {
	pub run_id: Uuid,
	pub trigger: String,
	pub started_at: OffsetDateTime,
	pub finished_at: Option<OffsetDateTime>,
	pub outcome: Option<String>,
	pub counts: Value,
	pub errors: Value,
	pub fetch_failed: bool,
	pub cancelled: bool,
}
impl TryFrom<RunRow> for PipelineRun {
	type Error = Error;

	fn try_from(row: RunRow) -> Result<Self> {
		let trigger = RunTrigger::parse(&row.trigger)
			.ok_or_else(|| Error::Corrupt(format!("Unknown run trigger {:?}.", row.trigger)))?;
		let outcome = match row.outcome.as_deref() {
			Some(raw) => Some(
				RunOutcome::parse(raw)
					.ok_or_else(|| Error::Corrupt(format!("Unknown run outcome {raw:?}.")))?,
			),
			None => None,
		};

		Ok(Self {
			run_id: row.run_id,
			trigger,
			started_at: row.started_at,
			finished_at: row.finished_at,
			outcome,
			counts: serde_json::from_value(row.counts)?,
			errors: serde_json::from_value(row.errors)?,
			fetch_failed: row.fetch_failed,
			cancelled: row.cancelled,
		})
	}
}
