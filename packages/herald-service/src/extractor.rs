//! Turns a fetched listing page into event drafts.
//!
//! Two sources of records are read from the same page: schema.org `Event` objects in JSON-LD
//! script blocks, then HTML listing cards. A card whose link points at an event already read
//! from JSON-LD is the same event and is skipped. A record that cannot be turned into a draft
//! is reported as a malformed fragment; it never discards the rest of the page.

use std::collections::{BTreeMap, HashSet};

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use time::{
	Date, OffsetDateTime, PrimitiveDateTime, Time,
	format_description::{BorrowedFormatItem, well_known::Rfc3339},
	macros::format_description,
};
use url::Url;

use crate::{Error, Result};
use herald_domain::{EventDraft, LocalZone, identity};

const CARD: &str = ".event-card, .event-item, article, .tribe-events-calendar-list__event";
const TITLE: &str = "h2, h3, .tribe-events-calendar-list__event-title, .title";
const LINK: &str = "a[href]";
const DATE_ATTR: &str = "time[datetime]";
const DATE_TEXT: &str = ".date, time, .tribe-events-calendar-list__event-datetime";
const LOCATION: &str = ".location, .venue, .tribe-events-calendar-list__event-venue";
const DESCRIPTION: &str = ".description, .tribe-events-calendar-list__event-description, p";
const JSON_LD: &str = r#"script[type="application/ld+json"]"#;
const OPEN_GRAPH: &str = r#"meta[property^="og:"]"#;
const CONTENT_ROOTS: [&str; 3] = ["main", "article", "body"];
const NOISE: [&str; 5] = ["nav", "footer", "header", "script", "style"];

const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_SNIPPET_CHARS: usize = 200;
const MAX_BODY_CHARS: usize = 3_000;

const ISO_SECONDS: &[BorrowedFormatItem<'static>] =
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const ISO_MINUTES: &[BorrowedFormatItem<'static>] =
	format_description!("[year]-[month]-[day]T[hour]:[minute]");
const SPACED_MINUTES: &[BorrowedFormatItem<'static>] =
	format_description!("[year]-[month]-[day] [hour]:[minute]");
const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedFragment {
	pub reason: String,
	pub snippet: String,
}

/// Some records on the page could not be parsed. `drafts` holds the ones that could.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{} malformed record(s) alongside {} parsed draft(s).", .malformed.len(), .drafts.len())]
pub struct PartialExtractionError {
	pub drafts: Vec<EventDraft>,
	pub malformed: Vec<MalformedFragment>,
}

/// What an event's own page adds to its listing card.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventDetail {
	/// Description of the first JSON-LD `Event` on the page.
	pub description: Option<String>,
	/// `og:*` meta properties, keyed by property name.
	pub open_graph: BTreeMap<String, String>,
	/// Visible text of the main content, without navigation and page chrome.
	pub body: String,
}
impl EventDetail {
	pub fn is_empty(&self) -> bool {
		self.description.is_none() && self.open_graph.is_empty() && self.body.is_empty()
	}
}

struct Selectors {
	card: Selector,
	title: Selector,
	link: Selector,
	date_attr: Selector,
	date_text: Selector,
	location: Selector,
	description: Selector,
	json_ld: Selector,
	open_graph: Selector,
	content_roots: Vec<Selector>,
}

pub struct Extractor {
	selectors: Selectors,
	zone: LocalZone,
}
impl Extractor {
	/// Dates printed without an offset are read in `zone`.
	pub fn new(zone: LocalZone) -> Result<Self> {
		Ok(Self {
			zone,
			selectors: Selectors {
				card: selector(CARD)?,
				title: selector(TITLE)?,
				link: selector(LINK)?,
				date_attr: selector(DATE_ATTR)?,
				date_text: selector(DATE_TEXT)?,
				location: selector(LOCATION)?,
				description: selector(DESCRIPTION)?,
				json_ld: selector(JSON_LD)?,
				open_graph: selector(OPEN_GRAPH)?,
				content_roots: CONTENT_ROOTS.into_iter().map(selector).collect::<Result<_>>()?,
			},
		})
	}

	/// Parses `raw` fetched from `base_url`. Relative links resolve against `base_url`.
	pub fn extract(
		&self,
		raw: &str,
		base_url: &str,
	) -> Result<Vec<EventDraft>, PartialExtractionError> {
		let doc = Html::parse_document(raw);
		let mut drafts = Vec::new();
		let mut malformed = Vec::new();

		for script in doc.select(&self.selectors.json_ld) {
			let text = script.text().collect::<String>();

			match serde_json::from_str::<Value>(&text) {
				Ok(value) => self.collect_json_ld(&value, base_url, &mut drafts, &mut malformed),
				Err(err) => malformed.push(MalformedFragment {
					reason: format!("Invalid JSON-LD: {err}."),
					snippet: snippet(&text),
				}),
			}
		}

		let listing = identity::normalize_url(base_url);
		let covered = drafts
			.iter()
			.map(|draft| identity::normalize_url(&draft.source_url))
			.filter(|url| *url != listing)
			.collect::<HashSet<_>>();

		for card in doc.select(&self.selectors.card) {
			let link = self.card_link(card).and_then(|href| resolve_url(base_url, href));

			if link.is_some_and(|link| covered.contains(&identity::normalize_url(&link))) {
				continue;
			}

			match self.parse_card(card, base_url) {
				Ok(draft) => drafts.push(draft),
				Err(reason) => malformed.push(MalformedFragment { reason, snippet: snippet(&card.html()) }),
			}
		}

		if malformed.is_empty() {
			Ok(drafts)
		} else {
			Err(PartialExtractionError { drafts, malformed })
		}
	}

	/// Reads an event's own page. Never fails; whatever cannot be read is left empty.
	pub fn detail(&self, raw: &str) -> EventDetail {
		let doc = Html::parse_document(raw);
		let s = &self.selectors;
		let description = doc
			.select(&s.json_ld)
			.map(|script| script.text().collect::<String>())
			.filter_map(|text| serde_json::from_str::<Value>(&text).ok())
			.find_map(|value| first_json_ld_event(&value).cloned())
			.and_then(|event| json_ld_text(&event, "description"))
			.map(|text| truncate(&text, MAX_DESCRIPTION_CHARS));
		let open_graph = doc
			.select(&s.open_graph)
			.filter_map(|meta| {
				let property = meta.value().attr("property")?.trim();
				let content = collapse_whitespace(meta.value().attr("content")?);

				(!content.is_empty()).then(|| (property.to_string(), content))
			})
			.collect();
		let body = s
			.content_roots
			.iter()
			.find_map(|root| doc.select(root).next())
			.map(|root| truncate(&visible_text(root), MAX_BODY_CHARS))
			.unwrap_or_default();

		EventDetail { description, open_graph, body }
	}

	fn card_link<'a>(&self, card: ElementRef<'a>) -> Option<&'a str> {
		card.select(&self.selectors.link)
			.find_map(|link| link.value().attr("href"))
			.map(str::trim)
			.filter(|href| !href.is_empty())
	}

	fn parse_card(&self, card: ElementRef<'_>, base_url: &str) -> Result<EventDraft, String> {
		let s = &self.selectors;
		let title = first_text(card, &s.title).ok_or("Card has no title.")?;
		let href = self.card_link(card).ok_or("Card has no link.")?;
		let source_url =
			resolve_url(base_url, href).ok_or_else(|| format!("Unresolvable link {href:?}."))?;
		let raw_date = card
			.select(&s.date_attr)
			.find_map(|time| time.value().attr("datetime"))
			.map(str::to_string)
			.or_else(|| first_text(card, &s.date_text))
			.ok_or("Card has no date.")?;
		let start_time = parse_datetime(&raw_date, self.zone)
			.ok_or_else(|| format!("Unrecognized date {raw_date:?}."))?;

		Ok(EventDraft {
			title,
			start_time,
			end_time: None,
			location: first_text(card, &s.location),
			source_url,
			description: first_text(card, &s.description).map(|text| truncate(&text, MAX_DESCRIPTION_CHARS)),
		})
	}

	fn collect_json_ld(
		&self,
		value: &Value,
		base_url: &str,
		drafts: &mut Vec<EventDraft>,
		malformed: &mut Vec<MalformedFragment>,
	) {
		match value {
			Value::Array(items) =>
				for item in items {
					self.collect_json_ld(item, base_url, drafts, malformed);
				},
			Value::Object(map) => {
				if let Some(graph) = map.get("@graph") {
					self.collect_json_ld(graph, base_url, drafts, malformed);
				}
				if is_event_type(map.get("@type")) {
					match self.json_ld_event(value, base_url) {
						Ok(draft) => drafts.push(draft),
						Err(reason) => malformed
							.push(MalformedFragment { reason, snippet: snippet(&value.to_string()) }),
					}
				}
			},
			_ => {},
		}
	}

	fn json_ld_event(&self, value: &Value, base_url: &str) -> Result<EventDraft, String> {
		let title = json_ld_text(value, "name").ok_or("JSON-LD event has no name.")?;
		let raw_start = value
			.get("startDate")
			.and_then(Value::as_str)
			.ok_or("JSON-LD event has no startDate.")?;
		let start_time = parse_datetime(raw_start, self.zone)
			.ok_or_else(|| format!("Unrecognized date {raw_start:?}."))?;
		let end_time = value
			.get("endDate")
			.and_then(Value::as_str)
			.and_then(|raw| parse_datetime(raw, self.zone));
		let source_url = match json_ld_text(value, "url") {
			Some(url) =>
				resolve_url(base_url, &url).ok_or_else(|| format!("Unresolvable link {url:?}."))?,
			None => base_url.to_string(),
		};

		Ok(EventDraft {
			title,
			start_time,
			end_time,
			location: value.get("location").and_then(json_ld_location),
			source_url,
			description: json_ld_text(value, "description")
				.map(|text| truncate(&text, MAX_DESCRIPTION_CHARS)),
		})
	}
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD`, and `D. M. YYYY [HH:MM]`. Forms
/// without an offset are wall-clock readings in `zone`.
pub fn parse_datetime(raw: &str, zone: LocalZone) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Some(at);
	}

	for format in [ISO_SECONDS, ISO_MINUTES, SPACED_MINUTES] {
		if let Ok(at) = PrimitiveDateTime::parse(raw, format) {
			return Some(zone.assume(at));
		}
	}

	if let Ok(date) = Date::parse(raw, ISO_DATE) {
		return Some(zone.assume(date.midnight()));
	}

	parse_dotted_date(raw).map(|local| zone.assume(local))
}

fn parse_dotted_date(raw: &str) -> Option<PrimitiveDateTime> {
	let start = raw.find(|ch: char| ch.is_ascii_digit())?;
	let mut parts = raw[start..].splitn(3, '.');
	let day: u8 = parts.next()?.trim().parse().ok()?;
	let month: u8 = parts.next()?.trim().parse().ok()?;
	let mut rest = parts.next()?.split_whitespace();
	let year: i32 = rest.next()?.trim_end_matches(',').parse().ok()?;
	let month = time::Month::try_from(month).ok()?;
	let date = Date::from_calendar_date(year, month, day).ok()?;
	let time = match rest.next() {
		Some(clock) => {
			let (hour, minute) = clock.split_once(':')?;

			Time::from_hms(hour.parse().ok()?, minute.parse().ok()?, 0).ok()?
		},
		None => Time::MIDNIGHT,
	};

	Some(PrimitiveDateTime::new(date, time))
}

/// Resolves `href` against `base` the way a browser would. `None` when either is unusable.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
	let base = Url::parse(base.trim()).ok()?;

	base.join(href.trim()).ok().map(String::from)
}

fn first_json_ld_event(value: &Value) -> Option<&Value> {
	match value {
		Value::Array(items) => items.iter().find_map(first_json_ld_event),
		Value::Object(map) => {
			if is_event_type(map.get("@type")) {
				return Some(value);
			}

			map.get("@graph").and_then(first_json_ld_event)
		},
		_ => None,
	}
}

// schema.org has many Event subtypes (EducationEvent, SocialEvent, ...).
fn is_event_type(kind: Option<&Value>) -> bool {
	match kind {
		Some(Value::String(kind)) => kind.ends_with("Event"),
		Some(Value::Array(kinds)) =>
			kinds.iter().any(|kind| kind.as_str().is_some_and(|kind| kind.ends_with("Event"))),
		_ => false,
	}
}

/// A JSON-LD string field as plain text. Publishers often leave HTML entities and markup in
/// these, so the value goes through the HTML parser first.
fn json_ld_text(value: &Value, key: &str) -> Option<String> {
	value.get(key).and_then(Value::as_str).map(plain_text).filter(|text| !text.is_empty())
}

fn plain_text(raw: &str) -> String {
	if !raw.contains(['&', '<']) {
		return collapse_whitespace(raw);
	}

	collapse_whitespace(&Html::parse_fragment(raw).root_element().text().collect::<String>())
}

fn json_ld_location(location: &Value) -> Option<String> {
	match location {
		Value::String(text) => Some(plain_text(text)).filter(|text| !text.is_empty()),
		Value::Array(items) => items.iter().find_map(json_ld_location),
		Value::Object(map) => {
			let name = map.get("name").and_then(Value::as_str).map(plain_text);
			let address = map.get("address").and_then(|address| match address {
				Value::String(text) => Some(plain_text(text)),
				Value::Object(parts) => {
					let joined = ["streetAddress", "addressLocality"]
						.iter()
						.filter_map(|key| parts.get(*key).and_then(Value::as_str))
						.map(plain_text)
						.filter(|part| !part.is_empty())
						.collect::<Vec<_>>()
						.join(", ");

					Some(joined)
				},
				_ => None,
			});
			let joined = [name, address]
				.into_iter()
				.flatten()
				.filter(|part| !part.is_empty())
				.collect::<Vec<_>>()
				.join(", ");

			Some(joined).filter(|text| !text.is_empty())
		},
		_ => None,
	}
}

fn selector(css: &'static str) -> Result<Selector> {
	Selector::parse(css).map_err(|err| Error::Selector { selector: css, message: err.to_string() })
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
	scope
		.select(selector)
		.map(|el| collapse_whitespace(&el.text().collect::<String>()))
		.find(|text| !text.is_empty())
}

fn visible_text(root: ElementRef<'_>) -> String {
	let mut out = String::new();

	for node in root.descendants() {
		let Some(text) = node.value().as_text() else {
			continue;
		};
		let hidden = node.ancestors().any(|ancestor| {
			ancestor.value().as_element().is_some_and(|element| NOISE.contains(&element.name()))
		});

		if !hidden {
			out.push_str(text);
			out.push(' ');
		}
	}

	collapse_whitespace(&out)
}

fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
	text.chars().take(max_chars).collect()
}

fn snippet(text: &str) -> String {
	truncate(&collapse_whitespace(text), MAX_SNIPPET_CHARS)
}

#[cfg(test)]
mod tests {
	use time::macros::{datetime, offset};

	use super::*;

	const BASE: &str = "https://datatalk.cz/akce/";

	#[test]
	fn parses_supported_date_forms() {
		let utc = LocalZone::UTC;

		assert_eq!(
			parse_datetime("2025-03-01T18:00:00+01:00", utc),
			Some(datetime!(2025-03-01 17:00 UTC))
		);
		assert_eq!(parse_datetime("2025-03-01T18:00", utc), Some(datetime!(2025-03-01 18:00 UTC)));
		assert_eq!(parse_datetime("2025-03-01", utc), Some(datetime!(2025-03-01 0:00 UTC)));
		assert_eq!(parse_datetime("1. 3. 2025", utc), Some(datetime!(2025-03-01 0:00 UTC)));
		assert_eq!(parse_datetime("Sobota 1.3.2025 18:30", utc), Some(datetime!(2025-03-01 18:30 UTC)));
		assert_eq!(parse_datetime("brzy", utc), None);
		assert_eq!(parse_datetime("31. 2. 2025", utc), None);
	}

	#[test]
	fn offsetless_dates_are_read_in_the_source_zone() {
		let prague = LocalZone::new(offset!(+1), true);

		assert_eq!(parse_datetime("2025-03-01T18:00", prague), Some(datetime!(2025-03-01 17:00 UTC)));
		assert_eq!(parse_datetime("12. 6. 2025 18:00", prague), Some(datetime!(2025-06-12 16:00 UTC)));
		assert_eq!(
			parse_datetime("2025-06-12T18:00:00Z", prague),
			Some(datetime!(2025-06-12 18:00 UTC))
		);
	}

	#[test]
	fn resolves_relative_links() {
		let resolve = |base: &str, href: &str| resolve_url(base, href);

		assert_eq!(resolve(BASE, "/akce/pydata").as_deref(), Some("https://datatalk.cz/akce/pydata"));
		assert_eq!(resolve(BASE, "pydata").as_deref(), Some("https://datatalk.cz/akce/pydata"));
		assert_eq!(resolve(BASE, "../o-nas").as_deref(), Some("https://datatalk.cz/o-nas"));
		assert_eq!(resolve(BASE, "?id=4").as_deref(), Some("https://datatalk.cz/akce/?id=4"));
		assert_eq!(resolve(BASE, "//cdn.datatalk.cz/x").as_deref(), Some("https://cdn.datatalk.cz/x"));
		assert_eq!(resolve("https://datatalk.cz", "pydata").as_deref(), Some("https://datatalk.cz/pydata"));
		assert_eq!(resolve(BASE, "https://meetup.com/e/1").as_deref(), Some("https://meetup.com/e/1"));
		assert_eq!(resolve("not a url", "pydata"), None);
	}

	#[test]
	fn location_objects_are_flattened() {
		let location = serde_json::json!({
			"@type": "Place",
			"name": "Impact Hub",
			"address": { "streetAddress": "Drtinova 10", "addressLocality": "Praha" },
		});

		assert_eq!(json_ld_location(&location).as_deref(), Some("Impact Hub, Drtinova 10, Praha"));
	}

	#[test]
	fn json_ld_strings_lose_entities_and_markup() {
		let event = serde_json::json!({
			"name": "PyData Prague &#8211; Meetup",
			"description": "<p>Talks &amp; beer</p>",
		});

		assert_eq!(json_ld_text(&event, "name").as_deref(), Some("PyData Prague \u{2013} Meetup"));
		assert_eq!(json_ld_text(&event, "description").as_deref(), Some("Talks & beer"));
		assert_eq!(json_ld_text(&event, "missing"), None);
	}
}
