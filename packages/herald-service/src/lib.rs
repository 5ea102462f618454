pub mod dispatcher;
pub mod enrichment;
pub mod extractor;
pub mod pipeline;
pub mod retry;
pub mod scheduler;

mod error;

pub use dispatcher::{ChannelReport, DeliveryOutcome, DispatchReport, Dispatcher};
pub use enrichment::{Enricher, EnrichmentError, EnrichmentOutcome};
pub use error::{Error, Result};
pub use extractor::{EventDetail, Extractor, MalformedFragment, PartialExtractionError};
pub use herald_providers::{DeliveryError, FetchError};
pub use herald_storage::BoxFuture;
pub use pipeline::{Pipeline, PipelineSettings};
pub use scheduler::{RunCoordinator, TriggerOutcome};

use std::sync::Arc;

use herald_config::{ChannelConfig, LlmProviderConfig, Source};
use herald_domain::Event;
use herald_providers::{ChannelClient, fetcher, summary};

pub trait SourceFetcher
where
	Self: Send + Sync,
{
	fn fetch<'a>(&'a self, cfg: &'a Source) -> BoxFuture<'a, Result<String, FetchError>>;

	/// Fetches an event's own page, identifying as the source's agent.
	fn fetch_detail<'a>(
		&'a self,
		url: &'a str,
		cfg: &'a Source,
		timeout_ms: u64,
	) -> BoxFuture<'a, Result<String, FetchError>>;
}

pub trait SummaryProvider
where
	Self: Send + Sync,
{
	fn summarize<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		event_text: &'a str,
	) -> BoxFuture<'a, Result<String, EnrichmentError>>;
}

/// One delivery mechanism. `target` is whatever the mechanism addresses: an email address, a
/// chat id.
pub trait NotificationChannel
where
	Self: Send + Sync,
{
	fn send<'a>(&'a self, target: &'a str, event: &'a Event) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

#[derive(Clone)]
pub struct Providers {
	pub fetcher: Arc<dyn SourceFetcher>,
	pub summary: Arc<dyn SummaryProvider>,
}
impl Default for Providers {
	fn default() -> Self {
		Self { fetcher: Arc::new(DefaultProviders), summary: Arc::new(DefaultProviders) }
	}
}

/// A configured, enabled channel.
#[derive(Clone)]
pub struct Channel {
	pub name: String,
	pub target: String,
	pub sender: Arc<dyn NotificationChannel>,
	/// Upper bound on a single send attempt.
	pub timeout_ms: u64,
}
impl Channel {
	pub fn from_config(cfg: &ChannelConfig) -> Result<Self> {
		let client = ChannelClient::from_config(cfg)?;

		Ok(Self {
			name: cfg.name.clone(),
			target: cfg.target.clone(),
			sender: Arc::new(client),
			timeout_ms: cfg.timeout_ms,
		})
	}
}

struct DefaultProviders;
impl SourceFetcher for DefaultProviders {
	fn fetch<'a>(&'a self, cfg: &'a Source) -> BoxFuture<'a, Result<String, FetchError>> {
		Box::pin(fetcher::fetch(cfg))
	}

	fn fetch_detail<'a>(
		&'a self,
		url: &'a str,
		cfg: &'a Source,
		timeout_ms: u64,
	) -> BoxFuture<'a, Result<String, FetchError>> {
		Box::pin(fetcher::fetch_page(url, cfg.user_agent.as_deref(), timeout_ms))
	}
}

impl SummaryProvider for DefaultProviders {
	fn summarize<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		event_text: &'a str,
	) -> BoxFuture<'a, Result<String, EnrichmentError>> {
		Box::pin(async move {
			summary::summarize(cfg, event_text).await.map_err(|err| EnrichmentError {
				retryable: err.is_retryable(),
				message: err.to_string(),
			})
		})
	}
}

impl NotificationChannel for ChannelClient {
	fn send<'a>(&'a self, target: &'a str, event: &'a Event) -> BoxFuture<'a, Result<(), DeliveryError>> {
		Box::pin(ChannelClient::send(self, target, event))
	}
}
