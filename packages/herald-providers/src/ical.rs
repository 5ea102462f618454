//! Minimal RFC 5545 rendering of one event, attached to email notifications.

use time::{
	Duration, OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem,
	macros::format_description,
};

use herald_domain::Event;

const PRODID: &str = "-//hack.ink//Herald//EN";
const UTC_STAMP: &[BorrowedFormatItem<'static>] =
	format_description!("[year][month][day]T[hour][minute][second]Z");
const DEFAULT_DURATION: Duration = Duration::hours(2);
const MAX_LINE_OCTETS: usize = 75;

pub fn render(event: &Event) -> String {
	let end = event.end_time.unwrap_or(event.start_time + DEFAULT_DURATION);
	let mut lines = vec![
		"BEGIN:VCALENDAR".to_string(),
		"VERSION:2.0".to_string(),
		format!("PRODID:{PRODID}"),
		"METHOD:PUBLISH".to_string(),
		"BEGIN:VEVENT".to_string(),
		format!("UID:{}@herald", event.identity_key),
		format!("DTSTAMP:{}", stamp(event.last_changed_at)),
		format!("DTSTART:{}", stamp(event.start_time)),
		format!("DTEND:{}", stamp(end)),
		format!("SUMMARY:{}", escape_text(&event.title)),
	];

	if let Some(location) = event.location.as_deref() {
		lines.push(format!("LOCATION:{}", escape_text(location)));
	}
	if let Some(text) = event.summary.as_deref().or(event.description.as_deref()) {
		lines.push(format!("DESCRIPTION:{}", escape_text(text)));
	}

	lines.push(format!("URL:{}", event.source_url));
	lines.push("END:VEVENT".to_string());
	lines.push("END:VCALENDAR".to_string());

	let mut out = String::new();

	for line in lines {
		out.push_str(&fold(&line));
		out.push_str("\r\n");
	}

	out
}

pub fn filename(event: &Event) -> String {
	let short = event.identity_key.get(..12).unwrap_or(&event.identity_key);

	format!("event-{short}.ics")
}

fn stamp(at: OffsetDateTime) -> String {
	at.to_offset(UtcOffset::UTC).format(UTC_STAMP).unwrap_or_default()
}

fn escape_text(input: &str) -> String {
	let mut out = String::with_capacity(input.len());

	for ch in input.chars() {
		match ch {
			'\\' => out.push_str("\\\\"),
			';' => out.push_str("\\;"),
			',' => out.push_str("\\,"),
			'\n' => out.push_str("\\n"),
			'\r' => {},
			_ => out.push(ch),
		}
	}

	out
}

// Continuation lines start with a single space, which counts toward their length.
fn fold(line: &str) -> String {
	if line.len() <= MAX_LINE_OCTETS {
		return line.to_string();
	}

	let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
	let mut width = 0;

	for ch in line.chars() {
		let len = ch.len_utf8();

		if width + len > MAX_LINE_OCTETS {
			out.push_str("\r\n ");
			width = 1;
		}

		out.push(ch);
		width += len;
	}

	out
}
