mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	ChannelConfig, ChannelKind, Config, Delivery, Details, Enrichment, LlmProviderConfig, Postgres,
	Providers, RetryConfig, Scheduler, Service, Source, Storage,
};

use std::{collections::HashSet, fs, net::SocketAddr, path::Path};

use url::Url;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::invalid("storage.postgres.dsn", "must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::invalid("storage.postgres.pool_max_conns", "must be greater than zero."));
	}

	let admin_addr: SocketAddr = cfg
		.service
		.admin_bind
		.parse()
		.map_err(|_| Error::invalid("service.admin_bind", "must be a socket address."))?;

	if !admin_addr.ip().is_loopback() {
		return Err(Error::invalid("service.admin_bind", "must be a loopback address."));
	}
	match Url::parse(&cfg.source.url) {
		Ok(url) if matches!(url.scheme(), "http" | "https") => {},
		_ => return Err(Error::invalid("source.url", "must be an http or https URL.")),
	}
	if cfg.source.timeout_ms == 0 {
		return Err(Error::invalid("source.timeout_ms", "must be greater than zero."));
	}

	if cfg.details.concurrency == 0 {
		return Err(Error::invalid("details.concurrency", "must be greater than zero."));
	}
	if cfg.details.timeout_ms == 0 {
		return Err(Error::invalid("details.timeout_ms", "must be greater than zero."));
	}

	let cron_fields = cfg.scheduler.cron.split_whitespace().count();

	if !(5..=7).contains(&cron_fields) {
		return Err(Error::invalid("scheduler.cron", "must have five, six, or seven fields."));
	}

	for (label, retry) in [
		("source.retry", &cfg.source.retry),
		("enrichment.retry", &cfg.enrichment.retry),
		("delivery.retry", &cfg.delivery.retry),
	] {
		validate_retry(label, retry)?;
	}

	if let Some(llm) = cfg.providers.llm_summary.as_ref() {
		for (label, value) in [
			("providers.llm_summary.api_base", &llm.api_base),
			("providers.llm_summary.api_key", &llm.api_key),
			("providers.llm_summary.model", &llm.model),
		] {
			if value.trim().is_empty() {
				return Err(Error::invalid(label, "must be non-empty."));
			}
		}

		if !llm.temperature.is_finite() || llm.temperature < 0.0 {
			return Err(Error::invalid(
				"providers.llm_summary.temperature",
				"must be a finite number zero or greater.",
			));
		}
		if llm.timeout_ms == 0 {
			return Err(Error::invalid(
				"providers.llm_summary.timeout_ms",
				"must be greater than zero.",
			));
		}
		if llm.default_headers.values().any(|value| !value.is_string()) {
			return Err(Error::invalid(
				"providers.llm_summary.default_headers",
				"values must be strings.",
			));
		}
	}

	let mut names = HashSet::new();

	for channel in &cfg.channels {
		let label = format!("channels.{}", channel.name);

		if channel.name.trim().is_empty() {
			return Err(Error::invalid("channels.name", "must be non-empty."));
		}
		if !names.insert(channel.name.as_str()) {
			return Err(Error::invalid(label, "channel names must be unique."));
		}
		if channel.target.trim().is_empty() {
			return Err(Error::invalid(format!("{label}.target"), "must be non-empty."));
		}
		if channel.api_key.trim().is_empty() {
			return Err(Error::invalid(format!("{label}.api_key"), "must be non-empty."));
		}
		if channel.timeout_ms == 0 {
			return Err(Error::invalid(format!("{label}.timeout_ms"), "must be greater than zero."));
		}
		if channel.kind.is_email() {
			if channel.from.as_deref().map(str::trim).unwrap_or_default().is_empty() {
				return Err(Error::invalid(
					format!("{label}.from"),
					"is required for email channels.",
				));
			}
			if !channel.target.contains('@') {
				return Err(Error::invalid(
					format!("{label}.target"),
					"must be an email address for email channels.",
				));
			}
		}
	}

	Ok(())
}

fn validate_retry(label: &str, retry: &RetryConfig) -> Result<()> {
	if retry.max_attempts == 0 {
		return Err(Error::invalid(format!("{label}.max_attempts"), "must be greater than zero."));
	}
	if retry.max_backoff_ms < retry.base_backoff_ms {
		return Err(Error::invalid(
			format!("{label}.max_backoff_ms"),
			"must be greater than or equal to base_backoff_ms.",
		));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.source.url = cfg.source.url.trim().to_string();
	cfg.scheduler.cron = cfg.scheduler.cron.split_whitespace().collect::<Vec<_>>().join(" ");

	if cfg.source.user_agent.as_deref().map(|agent| agent.trim().is_empty()).unwrap_or(false) {
		cfg.source.user_agent = None;
	}
	if let Some(llm) = cfg.providers.llm_summary.as_mut() {
		llm.api_base = llm.api_base.trim_end_matches('/').to_string();
	}

	for channel in &mut cfg.channels {
		channel.name = channel.name.trim().to_string();
		channel.target = channel.target.trim().to_string();

		if channel.api_base.as_deref().map(|base| base.trim().is_empty()).unwrap_or(false) {
			channel.api_base = None;
		}
		if let Some(base) = channel.api_base.as_mut() {
			*base = base.trim_end_matches('/').to_string();
		}
	}
}

impl Config {
	pub fn enabled_channels(&self) -> impl Iterator<Item = &ChannelConfig> {
		self.channels.iter().filter(|channel| channel.enabled)
	}
}
