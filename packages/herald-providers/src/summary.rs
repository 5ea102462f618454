use serde_json::Value;

use crate::{Error, Result};
use herald_config::LlmProviderConfig;

const SYSTEM_PROMPT: &str = "You summarize community tech events for notification messages. \
Reply with two or three plain sentences covering the topic, format, and intended audience. \
Do not repeat the date or the venue. Do not use markdown.";

/// Asks an OpenAI-compatible chat completion endpoint for a short summary of `event_text`.
pub async fn summarize(cfg: &LlmProviderConfig, event_text: &str) -> Result<String> {
	let client = crate::http_client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": [
			{ "role": "system", "content": SYSTEM_PROMPT },
			{ "role": "user", "content": event_text },
		],
	});
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_summary_response(&json)
}

pub fn parse_summary_response(json: &Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Summary response is missing message content.".to_string(),
		})?;
	let summary = strip_code_fence(content).trim();

	if summary.is_empty() {
		return Err(Error::InvalidResponse { message: "Summary response is empty.".to_string() });
	}

	Ok(summary.to_string())
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	// Drop the info string, if any.
	let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");

	body.trim_end().strip_suffix("```").unwrap_or(body)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "  A meetup about dataframes.\n" } }
			]
		});

		assert_eq!(
			parse_summary_response(&json).expect("Failed to parse summary."),
			"A meetup about dataframes."
		);
	}

	#[test]
	fn strips_markdown_fences() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "```text\nHands-on polars workshop.\n```" } }
			]
		});

		assert_eq!(
			parse_summary_response(&json).expect("Failed to parse summary."),
			"Hands-on polars workshop."
		);
	}

	#[test]
	fn rejects_missing_or_empty_content() {
		assert!(parse_summary_response(&serde_json::json!({ "choices": [] })).is_err());

		let empty = serde_json::json!({ "choices": [{ "message": { "content": "```\n```" } }] });
		let err = parse_summary_response(&empty).expect_err("Expected empty summary error.");

		assert!(!err.is_retryable());
	}
}
