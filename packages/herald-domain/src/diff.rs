use std::collections::{HashMap, HashSet};

use crate::event::{Classification, Event, EventDraft};

/// A draft paired with its derived identity and content projections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
	pub draft: EventDraft,
	pub identity_key: String,
	pub content_hash: String,
}
impl Candidate {
	pub fn from_draft(draft: EventDraft) -> Self {
		let identity_key = draft.identity_key();
		let content_hash = draft.content_hash();

		Self { draft, identity_key, content_hash }
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classified {
	pub candidate: Candidate,
	pub classification: Classification,
}

/// Derives candidates from drafts, keeping the first occurrence of each identity key.
/// Returns the candidates and the number of in-batch duplicates dropped.
pub fn dedupe_batch(drafts: Vec<EventDraft>) -> (Vec<Candidate>, usize) {
	let mut seen = HashSet::new();
	let mut out = Vec::with_capacity(drafts.len());
	let mut dropped = 0;

	for draft in drafts {
		let candidate = Candidate::from_draft(draft);

		if seen.insert(candidate.identity_key.clone()) {
			out.push(candidate);
		} else {
			dropped += 1;
		}
	}

	(out, dropped)
}

pub fn classify(candidate: &Candidate, stored: Option<&Event>) -> Classification {
	match stored {
		None => Classification::New,
		Some(event) if event.content_hash == candidate.content_hash => Classification::Unchanged,
		Some(_) => Classification::Changed,
	}
}

/// Classifies each candidate against a read-only view of stored events. Stored events absent
/// from `candidates` are not reported; disappearance is never treated as a signal.
pub fn diff(candidates: Vec<Candidate>, stored: &HashMap<String, Event>) -> Vec<Classified> {
	candidates
		.into_iter()
		.map(|candidate| {
			let classification = classify(&candidate, stored.get(&candidate.identity_key));

			Classified { candidate, classification }
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn draft(title: &str, location: &str) -> EventDraft {
		EventDraft {
			title: title.to_string(),
			start_time: datetime!(2025-03-01 18:00 UTC),
			end_time: None,
			location: Some(location.to_string()),
			source_url: "https://datatalk.cz/akce/pydata".to_string(),
			description: None,
		}
	}

	fn stored(candidate: &Candidate) -> Event {
		Event::observe(
			candidate.draft.clone(),
			candidate.identity_key.clone(),
			candidate.content_hash.clone(),
			None,
			None,
			datetime!(2025-02-01 08:00 UTC),
		)
	}

	#[test]
	fn batch_keeps_first_occurrence_of_identity() {
		let (candidates, dropped) = dedupe_batch(vec![
			draft("PyData Meetup", "Prague"),
			draft("pydata   meetup", "Brno"),
			draft("Rust Meetup", "Prague"),
		]);

		assert_eq!(dropped, 1);
		assert_eq!(candidates.len(), 2);
		assert_eq!(candidates[0].draft.location.as_deref(), Some("Prague"));
	}

	#[test]
	fn classifies_new_changed_and_unchanged() {
		let original = Candidate::from_draft(draft("PyData Meetup", "Prague"));
		let cosmetic = Candidate::from_draft(draft("  PYDATA meetup ", "prague"));
		let moved = Candidate::from_draft(draft("PyData Meetup", "Brno"));
		let mut store = HashMap::new();

		assert_eq!(classify(&original, None), Classification::New);

		store.insert(original.identity_key.clone(), stored(&original));

		let classified = diff(vec![cosmetic, moved], &store);

		assert_eq!(classified[0].classification, Classification::Unchanged);
		assert_eq!(classified[1].classification, Classification::Changed);
	}

	#[test]
	fn stored_events_missing_from_fetch_are_ignored() {
		let gone = Candidate::from_draft(draft("Old Meetup", "Prague"));
		let mut store = HashMap::new();

		store.insert(gone.identity_key.clone(), stored(&gone));

		assert!(diff(Vec::new(), &store).is_empty());
		assert_eq!(store.len(), 1);
	}
}
