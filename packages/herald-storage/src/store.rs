use std::{collections::HashMap, future::Future, pin::Pin};

use crate::Result;
use herald_domain::{Classification, DeliveryRecord, Event, PipelineRun};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable home of events, delivery state, and run history.
///
/// A single pipeline run is the only writer, so implementations guarantee per-call atomicity
/// and nothing more.
pub trait EventStore
where
	Self: Send + Sync,
{
	fn get_by_identity<'a>(&'a self, identity_key: &'a str) -> BoxFuture<'a, Result<Option<Event>>>;

	/// Most recently seen first; ties go to the earlier start.
	fn recent_events(&self, limit: u32) -> BoxFuture<'_, Result<Vec<Event>>>;

	/// Read-only view of the stored events among `identity_keys`.
	fn get_many<'a>(
		&'a self,
		identity_keys: &'a [String],
	) -> BoxFuture<'a, Result<HashMap<String, Event>>>;

	/// Writes `event` and, when its content hash is new for this identity, a `pending` record
	/// per channel in `pending_channels`. Both land or neither does. Returns how the event
	/// compared to what was stored before the write.
	fn upsert<'a>(
		&'a self,
		event: &'a Event,
		pending_channels: &'a [String],
	) -> BoxFuture<'a, Result<Classification>>;

	fn get_delivery<'a>(
		&'a self,
		identity_key: &'a str,
		channel: &'a str,
		content_hash: &'a str,
	) -> BoxFuture<'a, Result<Option<DeliveryRecord>>>;

	/// Inserts or replaces a delivery record. A record already `sent` is left as is.
	fn record_delivery<'a>(&'a self, record: &'a DeliveryRecord) -> BoxFuture<'a, Result<()>>;

	/// Pending and retryable records that belong to the current version of their event.
	fn outstanding_deliveries(&self) -> BoxFuture<'_, Result<Vec<DeliveryRecord>>>;

	fn create_run<'a>(&'a self, run: &'a PipelineRun) -> BoxFuture<'a, Result<()>>;

	fn finish_run<'a>(&'a self, run: &'a PipelineRun) -> BoxFuture<'a, Result<()>>;

	/// Most recent runs first.
	fn recent_runs(&self, limit: u32) -> BoxFuture<'_, Result<Vec<PipelineRun>>>;
}
