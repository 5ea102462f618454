use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
	Pending,
	Sent,
	FailedPermanent,
	FailedRetryable,
}
impl DeliveryStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Sent => "sent",
			Self::FailedPermanent => "failed_permanent",
			Self::FailedRetryable => "failed_retryable",
		}
	}

	/// Sent and permanently failed records are never attempted again.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Sent | Self::FailedPermanent)
	}

	pub fn is_outstanding(self) -> bool {
		!self.is_terminal()
	}
}
impl fmt::Display for DeliveryStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for DeliveryStatus {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"pending" => Ok(Self::Pending),
			"sent" => Ok(Self::Sent),
			"failed_permanent" => Ok(Self::FailedPermanent),
			"failed_retryable" => Ok(Self::FailedRetryable),
			other => Err(format!("Unknown delivery status {other:?}.")),
		}
	}
}

/// Delivery state of one event version on one channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
	pub identity_key: String,
	pub channel: String,
	pub content_hash: String,
	pub status: DeliveryStatus,
	pub attempt_count: u32,
	#[serde(with = "time::serde::rfc3339::option")]
	pub last_attempt_at: Option<OffsetDateTime>,
	pub last_error: Option<String>,
}
impl DeliveryRecord {
	pub fn pending(identity_key: &str, channel: &str, content_hash: &str) -> Self {
		Self {
			identity_key: identity_key.to_string(),
			channel: channel.to_string(),
			content_hash: content_hash.to_string(),
			status: DeliveryStatus::Pending,
			attempt_count: 0,
			last_attempt_at: None,
			last_error: None,
		}
	}

	/// Records the result of a send that took `attempts` tries, ending at `at`.
	pub fn settle(
		&mut self,
		status: DeliveryStatus,
		attempts: u32,
		at: OffsetDateTime,
		error: Option<String>,
	) {
		self.status = status;
		self.attempt_count = self.attempt_count.saturating_add(attempts);
		self.last_attempt_at = Some(at);
		self.last_error = error;
	}
}
