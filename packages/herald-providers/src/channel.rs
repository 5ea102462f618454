use reqwest::{Response, StatusCode};

use crate::{Result, email, telegram};
use herald_config::{ChannelConfig, ChannelKind};
use herald_domain::Event;

const MAX_BODY_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
	#[error("Retryable delivery failure: {message}")]
	Retryable { message: String },
	#[error("Permanent delivery failure: {message}")]
	Permanent { message: String },
}
impl DeliveryError {
	pub fn retryable(message: impl Into<String>) -> Self {
		Self::Retryable { message: message.into() }
	}

	pub fn permanent(message: impl Into<String>) -> Self {
		Self::Permanent { message: message.into() }
	}

	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Retryable { .. })
	}

	pub fn message(&self) -> &str {
		match self {
			Self::Retryable { message } | Self::Permanent { message } => message,
		}
	}

	pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			return Self::retryable("Request timed out.");
		}
		if err.is_builder() {
			return Self::permanent(err.to_string());
		}

		Self::retryable(err.to_string())
	}

	pub(crate) fn from_status(status: StatusCode, detail: &str) -> Self {
		let detail: String = detail.trim().chars().take(MAX_BODY_CHARS).collect();
		let message = if detail.is_empty() {
			format!("HTTP {}.", status.as_u16())
		} else {
			format!("HTTP {}: {detail}", status.as_u16())
		};

		if crate::is_retryable_status(status) {
			Self::Retryable { message }
		} else {
			Self::Permanent { message }
		}
	}
}

/// Configured delivery backends. The set is closed; picking one happens once, at startup.
#[derive(Debug, Clone)]
pub enum ChannelClient {
	Resend(email::Resend),
	SendGrid(email::SendGrid),
	Telegram(telegram::Telegram),
}
impl ChannelClient {
	pub fn from_config(cfg: &ChannelConfig) -> Result<Self> {
		let client = crate::http_client(cfg.timeout_ms)?;
		let from = cfg.from.clone().unwrap_or_default();
		let api_base = cfg.api_base().to_string();
		let api_key = cfg.api_key.clone();

		Ok(match cfg.kind {
			ChannelKind::Resend => Self::Resend(email::Resend { client, api_base, api_key, from }),
			ChannelKind::Sendgrid =>
				Self::SendGrid(email::SendGrid { client, api_base, api_key, from }),
			ChannelKind::Telegram => Self::Telegram(telegram::Telegram { client, api_base, api_key }),
		})
	}

	/// One attempt to notify `target` about `event`.
	pub async fn send(&self, target: &str, event: &Event) -> Result<(), DeliveryError> {
		match self {
			Self::Resend(client) => client.send(target, event).await,
			Self::SendGrid(client) => client.send(target, event).await,
			Self::Telegram(client) => client.send(target, event).await,
		}
	}
}

/// Maps a provider response to success or a classified failure.
pub(crate) async fn check_response(res: Response) -> Result<(), DeliveryError> {
	let status = res.status();

	if status.is_success() {
		return Ok(());
	}

	let body = res.text().await.unwrap_or_default();

	Err(DeliveryError::from_status(status, &body))
}
