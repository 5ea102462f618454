use time::{OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description};

use herald_domain::Event;

const DISPLAY_TIME: &[BorrowedFormatItem<'static>] =
	format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

pub fn subject(event: &Event) -> String {
	let prefix = if event.is_first_version() { "New event" } else { "Updated event" };

	format!("{prefix}: {}", event.title)
}

pub fn display_time(at: OffsetDateTime) -> String {
	at.to_offset(UtcOffset::UTC).format(DISPLAY_TIME).unwrap_or_else(|_| at.to_string())
}

pub fn email_html(event: &Event) -> String {
	let mut out = String::new();

	out.push_str(&format!("<h2>{}</h2>\n", escape_html(&event.title)));
	out.push_str(&format!("<p><strong>When:</strong> {}", display_time(event.start_time)));

	if let Some(end) = event.end_time {
		out.push_str(&format!(" to {}", display_time(end)));
	}

	out.push_str("</p>\n");
	out.push_str(&format!(
		"<p><strong>Where:</strong> {}</p>\n",
		escape_html(event.location.as_deref().unwrap_or("TBD"))
	));

	if let Some(summary) = event.summary.as_deref() {
		out.push_str(&format!("<p>{}</p>\n", escape_html(summary)));
	}

	out.push_str(&format!(
		"<p><a href=\"{}\">Event details</a></p>\n",
		escape_html(&event.source_url)
	));

	out
}

pub fn email_text(event: &Event) -> String {
	let mut lines = vec![
		event.title.clone(),
		format!("When: {}", display_time(event.start_time)),
		format!("Where: {}", event.location.as_deref().unwrap_or("TBD")),
	];

	if let Some(summary) = event.summary.as_deref() {
		lines.push(String::new());
		lines.push(summary.to_string());
	}

	lines.push(String::new());
	lines.push(event.source_url.clone());

	lines.join("\n")
}

/// Telegram message body for `parse_mode=HTML`.
pub fn telegram_html(event: &Event) -> String {
	let heading = if event.is_first_version() { "New event" } else { "Updated event" };
	let mut out = format!(
		"<b>{heading}: {}</b>\n{}\n{}",
		escape_html(&event.title),
		display_time(event.start_time),
		escape_html(event.location.as_deref().unwrap_or("TBD")),
	);

	if let Some(summary) = event.summary.as_deref() {
		out.push_str("\n\n");
		out.push_str(&escape_html(summary));
	}

	out.push_str(&format!("\n\n<a href=\"{}\">More info</a>", escape_html(&event.source_url)));

	out
}

pub fn escape_html(input: &str) -> String {
	let mut out = String::with_capacity(input.len());

	for ch in input.chars() {
		match ch {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			_ => out.push(ch),
		}
	}

	out
}
