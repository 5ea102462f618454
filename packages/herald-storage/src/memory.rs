use std::{
	collections::{HashMap, HashSet},
	sync::{Mutex, MutexGuard},
};

use crate::{BoxFuture, Error, Result, store::EventStore};
use herald_domain::{Classification, DeliveryRecord, DeliveryStatus, Event, PipelineRun};

type DeliveryKey = (String, String, String);

#[derive(Default)]
struct State {
	events: HashMap<String, Event>,
	deliveries: HashMap<DeliveryKey, DeliveryRecord>,
	runs: Vec<PipelineRun>,
	failing_upserts: HashSet<String>,
}

/// Process-local store with the same semantics as [`crate::PgStore`]. Used by tests and by
/// local dry runs; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
	state: Mutex<State>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every upsert of `identity_key` fail until cleared.
	pub fn fail_upserts_for(&self, identity_key: &str) {
		self.lock().failing_upserts.insert(identity_key.to_string());
	}

	pub fn clear_failures(&self) {
		self.lock().failing_upserts.clear();
	}

	pub fn events(&self) -> Vec<Event> {
		let mut events = self.lock().events.values().cloned().collect::<Vec<_>>();

		events.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.identity_key.cmp(&b.identity_key)));

		events
	}

	pub fn deliveries(&self) -> Vec<DeliveryRecord> {
		let mut records = self.lock().deliveries.values().cloned().collect::<Vec<_>>();

		records.sort_by(|a, b| {
			(&a.identity_key, &a.channel, &a.content_hash).cmp(&(
				&b.identity_key,
				&b.channel,
				&b.content_hash,
			))
		});

		records
	}

	pub fn runs(&self) -> Vec<PipelineRun> {
		self.lock().runs.clone()
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn upsert_now(&self, event: &Event, pending_channels: &[String]) -> Result<Classification> {
		let mut state = self.lock();

		if state.failing_upserts.contains(&event.identity_key) {
			return Err(Error::Unavailable(format!(
				"Injected upsert failure for {}.",
				event.identity_key
			)));
		}

		let classification = match state.events.get(&event.identity_key) {
			None => Classification::New,
			Some(stored) if stored.content_hash == event.content_hash => Classification::Unchanged,
			Some(_) => Classification::Changed,
		};

		match classification {
			Classification::Unchanged => {
				if let Some(stored) = state.events.get_mut(&event.identity_key) {
					stored.last_seen_at = event.last_seen_at;
				}
			},
			Classification::New | Classification::Changed => {
				state.events.insert(event.identity_key.clone(), event.clone());

				for channel in pending_channels {
					let key = delivery_key(&event.identity_key, channel, &event.content_hash);

					state.deliveries.entry(key).or_insert_with(|| {
						DeliveryRecord::pending(&event.identity_key, channel, &event.content_hash)
					});
				}
			},
		}

		Ok(classification)
	}
}
impl EventStore for MemoryStore {
	fn get_by_identity<'a>(&'a self, identity_key: &'a str) -> BoxFuture<'a, Result<Option<Event>>> {
		let event = self.lock().events.get(identity_key).cloned();

		Box::pin(async move { Ok(event) })
	}

	fn recent_events(&self, limit: u32) -> BoxFuture<'_, Result<Vec<Event>>> {
		let mut events = self.lock().events.values().cloned().collect::<Vec<_>>();

		events.sort_by(|a, b| {
			b.last_seen_at
				.cmp(&a.last_seen_at)
				.then(a.start_time.cmp(&b.start_time))
				.then(a.identity_key.cmp(&b.identity_key))
		});
		events.truncate(limit as usize);

		Box::pin(async move { Ok(events) })
	}

	fn get_many<'a>(
		&'a self,
		identity_keys: &'a [String],
	) -> BoxFuture<'a, Result<HashMap<String, Event>>> {
		let state = self.lock();
		let found = identity_keys
			.iter()
			.filter_map(|key| state.events.get(key).map(|event| (key.clone(), event.clone())))
			.collect();

		Box::pin(async move { Ok(found) })
	}

	fn upsert<'a>(
		&'a self,
		event: &'a Event,
		pending_channels: &'a [String],
	) -> BoxFuture<'a, Result<Classification>> {
		let result = self.upsert_now(event, pending_channels);

		Box::pin(async move { result })
	}

	fn get_delivery<'a>(
		&'a self,
		identity_key: &'a str,
		channel: &'a str,
		content_hash: &'a str,
	) -> BoxFuture<'a, Result<Option<DeliveryRecord>>> {
		let record =
			self.lock().deliveries.get(&delivery_key(identity_key, channel, content_hash)).cloned();

		Box::pin(async move { Ok(record) })
	}

	fn record_delivery<'a>(&'a self, record: &'a DeliveryRecord) -> BoxFuture<'a, Result<()>> {
		let mut state = self.lock();
		let key = delivery_key(&record.identity_key, &record.channel, &record.content_hash);
		let already_sent = state
			.deliveries
			.get(&key)
			.map(|existing| existing.status == DeliveryStatus::Sent)
			.unwrap_or(false);

		if !already_sent {
			state.deliveries.insert(key, record.clone());
		}

		drop(state);

		Box::pin(async move { Ok(()) })
	}

	fn outstanding_deliveries(&self) -> BoxFuture<'_, Result<Vec<DeliveryRecord>>> {
		let state = self.lock();
		let mut records = state
			.deliveries
			.values()
			.filter(|record| record.status.is_outstanding())
			.filter(|record| {
				state
					.events
					.get(&record.identity_key)
					.map(|event| event.content_hash == record.content_hash)
					.unwrap_or(false)
			})
			.cloned()
			.collect::<Vec<_>>();

		records.sort_by(|a, b| (&a.identity_key, &a.channel).cmp(&(&b.identity_key, &b.channel)));

		drop(state);

		Box::pin(async move { Ok(records) })
	}

	fn create_run<'a>(&'a self, run: &'a PipelineRun) -> BoxFuture<'a, Result<()>> {
		self.lock().runs.push(run.clone());

		Box::pin(async move { Ok(()) })
	}

	fn finish_run<'a>(&'a self, run: &'a PipelineRun) -> BoxFuture<'a, Result<()>> {
		let mut state = self.lock();

		if let Some(stored) = state
			.runs
			.iter_mut()
			.find(|stored| stored.run_id == run.run_id && stored.finished_at.is_none())
		{
			*stored = run.clone();
		}

		drop(state);

		Box::pin(async move { Ok(()) })
	}

	fn recent_runs(&self, limit: u32) -> BoxFuture<'_, Result<Vec<PipelineRun>>> {
		let mut runs = self.lock().runs.clone();

		runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
		runs.truncate(limit as usize);

		Box::pin(async move { Ok(runs) })
	}
}

fn delivery_key(identity_key: &str, channel: &str, content_hash: &str) -> DeliveryKey {
	(identity_key.to_string(), channel.to_string(), content_hash.to_string())
}
