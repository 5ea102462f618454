use std::{future::Future, time::Duration};

use herald_config::RetryConfig;
use herald_domain::RetryPolicy;

const MAX_ERROR_CHARS: usize = 1_024;

/// Result of an operation run under a [`RetryPolicy`], with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
	pub result: Result<T, E>,
	pub attempts: u32,
}

pub fn policy_from_config(cfg: &RetryConfig) -> RetryPolicy {
	RetryPolicy::new(
		cfg.max_attempts,
		Duration::from_millis(cfg.base_backoff_ms),
		Duration::from_millis(cfg.max_backoff_ms),
		cfg.jitter,
	)
}

/// Runs `op` until it succeeds, fails with an error `is_retryable` rejects, or the policy runs
/// out of attempts.
pub async fn with_retry<T, E, F, Fut, R>(
	policy: &RetryPolicy,
	is_retryable: R,
	mut op: F,
) -> Attempted<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	R: Fn(&E) -> bool,
	E: std::fmt::Display,
{
	let mut attempt = 1;

	loop {
		match op().await {
			Ok(value) => return Attempted { result: Ok(value), attempts: attempt },
			Err(err) if is_retryable(&err) && policy.should_retry(attempt) => {
				let delay = policy.delay_for_attempt(attempt);

				tracing::debug!(
					attempt,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"Retrying after retryable failure."
				);
				tokio::time::sleep(delay).await;

				attempt += 1;
			},
			Err(err) => return Attempted { result: Err(err), attempts: attempt },
		}
	}
}

/// Redacts credentials and bounds the length of error text before it is persisted.
pub fn sanitize_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		// Telegram carries the bot token in the request path.
		if let Some(start) = lowered.find("/bot") {
			let end = raw[start + 4..].find('/').map(|idx| start + 4 + idx).unwrap_or(raw.len());

			word = format!("{}/bot[REDACTED]{}", &raw[..start], &raw[end..]);
		}

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_ERROR_CHARS {
		out = out.chars().take(MAX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
