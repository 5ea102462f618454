//! Normalized projections used for dedup identity and change detection.
//!
//! The identity key answers "is this the same event": normalized title, the UTC calendar day of
//! the start time, and the normalized source URL. The content hash answers "did anything a
//! subscriber cares about change": normalized title, exact start and end instants, normalized
//! location and source URL. Neither ever looks at the summary, the description, or any
//! timestamp written by this system.

use time::OffsetDateTime;
use unicode_normalization::UnicodeNormalization;
use url::Url;

const IDENTITY_VERSION: &str = "identity:v1";
const CONTENT_VERSION: &str = "content:v1";
const FIELD_SEPARATOR: u8 = 0x1f;

/// NFKC, lower-cased, whitespace collapsed to single spaces and trimmed.
pub fn normalize_text(input: &str) -> String {
	let folded: String = input.nfkc().flat_map(char::to_lowercase).collect();

	folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cases scheme and host, resolves dot segments, and drops the default port, the
/// fragment, an empty query, and any trailing slash on the path. Input that does not parse as
/// an absolute URL is only trimmed.
pub fn normalize_url(input: &str) -> String {
	let trimmed = input.trim();
	let Ok(url) = Url::parse(trimmed) else {
		return trimmed.trim_end_matches('/').to_string();
	};
	let mut out = format!("{}://", url.scheme());

	if let Some(host) = url.host_str() {
		out.push_str(host);
	}
	if let Some(port) = url.port() {
		out.push_str(&format!(":{port}"));
	}

	out.push_str(url.path().trim_end_matches('/'));

	if let Some(query) = url.query().filter(|query| !query.is_empty()) {
		out.push('?');
		out.push_str(query);
	}

	out
}

pub fn identity_key(title: &str, start_time: OffsetDateTime, source_url: &str) -> String {
	let start_date = start_time.to_offset(time::UtcOffset::UTC).date();
	let mut hasher = blake3::Hasher::new();

	for field in [
		IDENTITY_VERSION,
		normalize_text(title).as_str(),
		start_date.to_string().as_str(),
		normalize_url(source_url).as_str(),
	] {
		hasher.update(field.as_bytes());
		hasher.update(&[FIELD_SEPARATOR]);
	}

	hasher.finalize().to_hex().to_string()
}

pub fn content_hash(
	title: &str,
	start_time: OffsetDateTime,
	end_time: Option<OffsetDateTime>,
	location: Option<&str>,
	source_url: &str,
) -> String {
	let mut hasher = blake3::Hasher::new();
	let end = end_time.map(|end| end.unix_timestamp().to_string()).unwrap_or_default();
	let location = location.map(normalize_text).unwrap_or_default();

	for field in [
		CONTENT_VERSION,
		normalize_text(title).as_str(),
		start_time.unix_timestamp().to_string().as_str(),
		end.as_str(),
		location.as_str(),
		normalize_url(source_url).as_str(),
	] {
		hasher.update(field.as_bytes());
		hasher.update(&[FIELD_SEPARATOR]);
	}

	hasher.finalize().to_hex().to_string()
}
