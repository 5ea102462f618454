use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::identity;

/// A candidate event as parsed from the source, before dedup and enrichment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
	pub title: String,
	#[serde(with = "time::serde::rfc3339")]
	pub start_time: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339::option")]
	pub end_time: Option<OffsetDateTime>,
	pub location: Option<String>,
	pub source_url: String,
	pub description: Option<String>,
}
impl EventDraft {
	pub fn identity_key(&self) -> String {
		identity::identity_key(&self.title, self.start_time, &self.source_url)
	}

	pub fn content_hash(&self) -> String {
		identity::content_hash(
			&self.title,
			self.start_time,
			self.end_time,
			self.location.as_deref(),
			&self.source_url,
		)
	}
}

/// The canonical stored form of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
	pub identity_key: String,
	pub title: String,
	#[serde(with = "time::serde::rfc3339")]
	pub start_time: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339::option")]
	pub end_time: Option<OffsetDateTime>,
	pub location: Option<String>,
	pub source_url: String,
	pub description: Option<String>,
	pub summary: Option<String>,
	pub content_hash: String,
	#[serde(with = "time::serde::rfc3339")]
	pub first_seen_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub last_seen_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub last_changed_at: OffsetDateTime,
}
impl Event {
	/// Builds the version of an event observed at `seen_at`, carrying lifecycle timestamps
	/// over from the stored version when there is one.
	pub fn observe(
		draft: EventDraft,
		identity_key: String,
		content_hash: String,
		summary: Option<String>,
		stored: Option<&Event>,
		seen_at: OffsetDateTime,
	) -> Self {
		let first_seen_at = stored.map(|event| event.first_seen_at).unwrap_or(seen_at);
		let last_changed_at = match stored {
			Some(event) if event.content_hash == content_hash => event.last_changed_at,
			_ => seen_at,
		};

		Self {
			identity_key,
			title: draft.title,
			start_time: draft.start_time,
			end_time: draft.end_time,
			location: draft.location,
			source_url: draft.source_url,
			description: draft.description,
			summary,
			content_hash,
			first_seen_at,
			last_seen_at: seen_at,
			last_changed_at,
		}
	}

	pub fn has_started(&self, now: OffsetDateTime) -> bool {
		self.start_time <= now
	}

	/// True until the content hash changes for the first time.
	pub fn is_first_version(&self) -> bool {
		self.first_seen_at == self.last_changed_at
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
	New,
	Changed,
	Unchanged,
}
impl Classification {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::New => "new",
			Self::Changed => "changed",
			Self::Unchanged => "unchanged",
		}
	}

	/// New and changed versions are the ones subscribers hear about.
	pub fn is_notifiable(self) -> bool {
		matches!(self, Self::New | Self::Changed)
	}
}
