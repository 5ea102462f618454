use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;

use crate::{
	BoxFuture, Result,
	db::Db,
	models::{DeliveryRow, EventRow, RunRow},
	store::EventStore,
};
use herald_domain::{Classification, DeliveryRecord, DeliveryStatus, Event, PipelineRun};

const EVENT_COLUMNS: &str = "\
identity_key, title, start_time, end_time, location, source_url, description, summary,
content_hash, first_seen_at, last_seen_at, last_changed_at";
const DELIVERY_COLUMNS: &str =
	"identity_key, channel, content_hash, status, attempt_count, last_attempt_at, last_error";
const RUN_COLUMNS: &str =
	"run_id, trigger, started_at, finished_at, outcome, counts, errors, fetch_failed, cancelled";

#[derive(Clone)]
pub struct PgStore {
	pool: PgPool,
}
impl PgStore {
	pub fn new(db: &Db) -> Self {
		Self { pool: db.pool.clone() }
	}

	async fn upsert_tx(&self, event: &Event, pending_channels: &[String]) -> Result<Classification> {
		let mut tx = self.pool.begin().await?;
		let stored: Option<(String,)> =
			sqlx::query_as("SELECT content_hash FROM events WHERE identity_key = $1 FOR UPDATE")
				.bind(event.identity_key.as_str())
				.fetch_optional(&mut *tx)
				.await?;
		let classification = match stored {
			None => Classification::New,
			Some((hash,)) if hash == event.content_hash => Classification::Unchanged,
			Some(_) => Classification::Changed,
		};

		match classification {
			Classification::New => insert_event(&mut *tx, event).await?,
			Classification::Changed => update_event(&mut *tx, event).await?,
			Classification::Unchanged => {
				sqlx::query("UPDATE events SET last_seen_at = $2 WHERE identity_key = $1")
					.bind(event.identity_key.as_str())
					.bind(event.last_seen_at)
					.execute(&mut *tx)
					.await?;
			},
		}

		if classification.is_notifiable() {
			for channel in pending_channels {
				sqlx::query(
					"\
INSERT INTO delivery_records (identity_key, channel, content_hash, status, attempt_count)
VALUES ($1, $2, $3, $4, 0)
ON CONFLICT (identity_key, channel, content_hash) DO NOTHING",
				)
				.bind(event.identity_key.as_str())
				.bind(channel.as_str())
				.bind(event.content_hash.as_str())
				.bind(DeliveryStatus::Pending.as_str())
				.execute(&mut *tx)
				.await?;
			}
		}

		tx.commit().await?;

		Ok(classification)
	}
}
impl EventStore for PgStore {
	fn get_by_identity<'a>(&'a self, identity_key: &'a str) -> BoxFuture<'a, Result<Option<Event>>> {
		Box::pin(async move {
			let row: Option<EventRow> = sqlx::query_as(&format!(
				"SELECT {EVENT_COLUMNS} FROM events WHERE identity_key = $1"
			))
			.bind(identity_key)
			.fetch_optional(&self.pool)
			.await?;

			Ok(row.map(Event::from))
		})
	}

	fn recent_events(&self, limit: u32) -> BoxFuture<'_, Result<Vec<Event>>> {
		Box::pin(async move {
			let rows: Vec<EventRow> = sqlx::query_as(&format!(
				"\
SELECT {EVENT_COLUMNS}
FROM events
ORDER BY last_seen_at DESC, start_time ASC, identity_key ASC
LIMIT $1"
			))
			.bind(i64::from(limit))
			.fetch_all(&self.pool)
			.await?;

			Ok(rows.into_iter().map(Event::from).collect())
		})
	}

	fn get_many<'a>(
		&'a self,
		identity_keys: &'a [String],
	) -> BoxFuture<'a, Result<HashMap<String, Event>>> {
		Box::pin(async move {
			if identity_keys.is_empty() {
				return Ok(HashMap::new());
			}

			let rows: Vec<EventRow> = sqlx::query_as(&format!(
				"SELECT {EVENT_COLUMNS} FROM events WHERE identity_key = ANY($1)"
			))
			.bind(identity_keys)
			.fetch_all(&self.pool)
			.await?;

			Ok(rows.into_iter().map(|row| (row.identity_key.clone(), Event::from(row))).collect())
		})
	}

	fn upsert<'a>(
		&'a self,
		event: &'a Event,
		pending_channels: &'a [String],
	) -> BoxFuture<'a, Result<Classification>> {
		Box::pin(self.upsert_tx(event, pending_channels))
	}

	fn get_delivery<'a>(
		&'a self,
		identity_key: &'a str,
		channel: &'a str,
		content_hash: &'a str,
	) -> BoxFuture<'a, Result<Option<DeliveryRecord>>> {
		Box::pin(async move {
			let row: Option<DeliveryRow> = sqlx::query_as(&format!(
				"\
SELECT {DELIVERY_COLUMNS}
FROM delivery_records
WHERE identity_key = $1 AND channel = $2 AND content_hash = $3"
			))
			.bind(identity_key)
			.bind(channel)
			.bind(content_hash)
			.fetch_optional(&self.pool)
			.await?;

			row.map(DeliveryRecord::try_from).transpose()
		})
	}

	fn record_delivery<'a>(&'a self, record: &'a DeliveryRecord) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let attempts = i32::try_from(record.attempt_count).unwrap_or(i32::MAX);

			sqlx::query(
				"\
INSERT INTO delivery_records (
	identity_key, channel, content_hash, status, attempt_count, last_attempt_at, last_error
)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (identity_key, channel, content_hash) DO UPDATE
SET
	status = EXCLUDED.status,
	attempt_count = EXCLUDED.attempt_count,
	last_attempt_at = EXCLUDED.last_attempt_at,
	last_error = EXCLUDED.last_error,
	updated_at = $8
WHERE delivery_records.status <> 'sent'",
			)
			.bind(record.identity_key.as_str())
			.bind(record.channel.as_str())
			.bind(record.content_hash.as_str())
			.bind(record.status.as_str())
			.bind(attempts)
			.bind(record.last_attempt_at)
			.bind(record.last_error.as_deref())
			.bind(OffsetDateTime::now_utc())
			.execute(&self.pool)
			.await?;

			Ok(())
		})
	}

	fn outstanding_deliveries(&self) -> BoxFuture<'_, Result<Vec<DeliveryRecord>>> {
		Box::pin(async move {
			let rows: Vec<DeliveryRow> = sqlx::query_as(
				"\
SELECT d.identity_key, d.channel, d.content_hash, d.status, d.attempt_count,
	d.last_attempt_at, d.last_error
FROM delivery_records d
JOIN events e ON e.identity_key = d.identity_key AND e.content_hash = d.content_hash
WHERE d.status IN ('pending', 'failed_retryable')
ORDER BY e.start_time ASC, d.identity_key ASC, d.channel ASC",
			)
			.fetch_all(&self.pool)
			.await?;

			rows.into_iter().map(DeliveryRecord::try_from).collect()
		})
	}

	fn create_run<'a>(&'a self, run: &'a PipelineRun) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sqlx::query(
				"\
INSERT INTO pipeline_runs (run_id, trigger, started_at, counts, errors)
VALUES ($1, $2, $3, $4, $5)",
			)
			.bind(run.run_id)
			.bind(run.trigger.as_str())
			.bind(run.started_at)
			.bind(serde_json::to_value(&run.counts)?)
			.bind(serde_json::to_value(&run.errors)?)
			.execute(&self.pool)
			.await?;

			Ok(())
		})
	}

	fn finish_run<'a>(&'a self, run: &'a PipelineRun) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut conn = self.pool.acquire().await?;

			write_finished_run(&mut *conn, run).await
		})
	}

	fn recent_runs(&self, limit: u32) -> BoxFuture<'_, Result<Vec<PipelineRun>>> {
		Box::pin(async move {
			let rows: Vec<RunRow> = sqlx::query_as(&format!(
				"SELECT {RUN_COLUMNS} FROM pipeline_runs ORDER BY started_at DESC LIMIT $1"
			))
			.bind(i64::from(limit))
			.fetch_all(&self.pool)
			.await?;

			rows.into_iter().map(PipelineRun::try_from).collect()
		})
	}
}

async fn insert_event(conn: &mut PgConnection, event: &Event) -> Result<()> {
	sqlx::query(&format!(
		"\
INSERT INTO events ({EVENT_COLUMNS})
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
	))
	.bind(event.identity_key.as_str())
	.bind(event.title.as_str())
	.bind(event.start_time)
	.bind(event.end_time)
	.bind(event.location.as_deref())
	.bind(event.source_url.as_str())
	.bind(event.description.as_deref())
	.bind(event.summary.as_deref())
	.bind(event.content_hash.as_str())
	.bind(event.first_seen_at)
	.bind(event.last_seen_at)
	.bind(event.last_changed_at)
	.execute(conn)
	.await?;

	Ok(())
}

async fn update_event(conn: &mut PgConnection, event: &Event) -> Result<()> {
	sqlx::query(
		"\
UPDATE events
SET
	title = $2,
	start_time = $3,
	end_time = $4,
	location = $5,
	source_url = $6,
	description = $7,
	summary = $8,
	content_hash = $9,
	last_seen_at = $10,
	last_changed_at = $11
WHERE identity_key = $1",
	)
	.bind(event.identity_key.as_str())
	.bind(event.title.as_str())
	.bind(event.start_time)
	.bind(event.end_time)
	.bind(event.location.as_deref())
	.bind(event.source_url.as_str())
	.bind(event.description.as_deref())
	.bind(event.summary.as_deref())
	.bind(event.content_hash.as_str())
	.bind(event.last_seen_at)
	.bind(event.last_changed_at)
	.execute(conn)
	.await?;

	Ok(())
}

// A run is finalized once; later writes for the same run are ignored.
async fn write_finished_run(conn: &mut PgConnection, run: &PipelineRun) -> Result<()> {
	sqlx::query(
		"\
UPDATE pipeline_runs
SET
	finished_at = $2,
	outcome = $3,
	counts = $4,
	errors = $5,
	fetch_failed = $6,
	cancelled = $7
WHERE run_id = $1 AND finished_at IS NULL",
	)
	.bind(run.run_id)
	.bind(run.finished_at)
	.bind(run.outcome.map(|outcome| outcome.as_str()))
	.bind(serde_json::to_value(&run.counts)?)
	.bind(serde_json::to_value(&run.errors)?)
	.bind(run.fetch_failed)
	.bind(run.cancelled)
	.execute(conn)
	.await?;

	Ok(())
}
