use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use time::{
	UtcOffset,
	format_description::BorrowedFormatItem,
	macros::format_description,
};

const UTC_OFFSET: &[BorrowedFormatItem<'static>] =
	format_description!("[offset_hour sign:mandatory]:[offset_minute]");

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub source: Source,
	pub scheduler: Scheduler,
	#[serde(default)]
	pub enrichment: Enrichment,
	#[serde(default)]
	pub details: Details,
	#[serde(default)]
	pub providers: Providers,
	#[serde(default)]
	pub delivery: Delivery,
	#[serde(default)]
	pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
	/// Loopback address for the run-now and run history endpoints.
	pub admin_bind: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Source {
	pub url: String,
	#[serde(default = "default_source_timeout_ms")]
	pub timeout_ms: u64,
	pub user_agent: Option<String>,
	#[serde(default)]
	pub retry: RetryConfig,
	/// Offset of dates the source prints without one, as `+HH:MM`.
	#[serde(default = "default_utc_offset", deserialize_with = "deserialize_utc_offset")]
	pub utc_offset: UtcOffset,
	/// Adds an hour to `utc_offset` during EU summer time.
	#[serde(default)]
	pub eu_summer_time: bool,
}

#[derive(Debug, Deserialize)]
pub struct Scheduler {
	/// Five-field (minute first) or six-field (second first) cron expression, evaluated in UTC.
	pub cron: String,
	#[serde(default)]
	pub run_on_start: bool,
	#[serde(default = "default_true")]
	pub queue_when_busy: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
	pub jitter: bool,
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self { max_attempts: 3, base_backoff_ms: 500, max_backoff_ms: 10_000, jitter: true }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Enrichment {
	pub retry: RetryConfig,
	/// Upper bound on the event text sent to the summary model.
	pub max_input_chars: usize,
}
impl Default for Enrichment {
	fn default() -> Self {
		Self { retry: RetryConfig::default(), max_input_chars: 3_000 }
	}
}

/// Per-event page fetches that feed summary enrichment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Details {
	pub enabled: bool,
	pub concurrency: usize,
	pub timeout_ms: u64,
}
impl Default for Details {
	fn default() -> Self {
		Self { enabled: true, concurrency: 5, timeout_ms: 15_000 }
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct Providers {
	/// Summary enrichment is disabled when this is absent.
	pub llm_summary: Option<LlmProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Delivery {
	pub retry: RetryConfig,
	/// When false, events that have already started are stored without pending deliveries.
	pub notify_past_events: bool,
}
impl Default for Delivery {
	fn default() -> Self {
		Self { retry: RetryConfig::default(), notify_past_events: true }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
	Resend,
	Sendgrid,
	Telegram,
}
impl ChannelKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Resend => "resend",
			Self::Sendgrid => "sendgrid",
			Self::Telegram => "telegram",
		}
	}

	pub fn is_email(self) -> bool {
		matches!(self, Self::Resend | Self::Sendgrid)
	}

	pub fn default_api_base(self) -> &'static str {
		match self {
			Self::Resend => "https://api.resend.com",
			Self::Sendgrid => "https://api.sendgrid.com",
			Self::Telegram => "https://api.telegram.org",
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
	/// Stable channel name; part of every delivery record key.
	pub name: String,
	pub kind: ChannelKind,
	/// Recipient address for email channels, chat id for Telegram.
	pub target: String,
	/// API key for email providers, bot token for Telegram.
	pub api_key: String,
	pub api_base: Option<String>,
	/// Sender address; required for email channels.
	pub from: Option<String>,
	#[serde(default = "default_channel_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default = "default_true")]
	pub enabled: bool,
}
impl ChannelConfig {
	pub fn api_base(&self) -> &str {
		self.api_base.as_deref().unwrap_or_else(|| self.kind.default_api_base())
	}
}

fn default_source_timeout_ms() -> u64 {
	30_000
}

fn default_utc_offset() -> UtcOffset {
	UtcOffset::UTC
}

fn deserialize_utc_offset<'de, D>(deserializer: D) -> Result<UtcOffset, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;

	UtcOffset::parse(raw.trim(), UTC_OFFSET).map_err(serde::de::Error::custom)
}

fn default_channel_timeout_ms() -> u64 {
	10_000
}

fn default_true() -> bool {
	true
}
