use reqwest::StatusCode;

use herald_config::Source;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
	#[error("Request to {url} failed: {message}")]
	Network { url: String, message: String },
	#[error("Source {url} returned HTTP {status}.")]
	HttpStatus { url: String, status: u16 },
	#[error("Request to {url} timed out after {timeout_ms} ms.")]
	Timeout { url: String, timeout_ms: u64 },
}
impl FetchError {
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Network { .. } => "network",
			Self::HttpStatus { .. } => "http_status",
			Self::Timeout { .. } => "timeout",
		}
	}

	/// Client errors other than 408 and 429 will fail the same way on every try.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Network { .. } | Self::Timeout { .. } => true,
			Self::HttpStatus { status, .. } => StatusCode::from_u16(*status)
				.map(crate::is_retryable_status)
				.unwrap_or(false),
		}
	}

	fn from_reqwest(url: &str, timeout_ms: u64, err: reqwest::Error) -> Self {
		if err.is_timeout() {
			return Self::Timeout { url: url.to_string(), timeout_ms };
		}

		Self::Network { url: url.to_string(), message: err.to_string() }
	}
}

/// Single GET of the source listing. Retries are the caller's business.
pub async fn fetch(cfg: &Source) -> Result<String, FetchError> {
	fetch_page(&cfg.url, cfg.user_agent.as_deref(), cfg.timeout_ms).await
}

/// Single GET of any page on the source, such as an event's own page.
pub async fn fetch_page(
	url: &str,
	user_agent: Option<&str>,
	timeout_ms: u64,
) -> Result<String, FetchError> {
	let client =
		crate::http_client(timeout_ms).map_err(|err| FetchError::from_reqwest(url, timeout_ms, err))?;
	let mut req = client.get(url);

	if let Some(agent) = user_agent {
		req = req.header(reqwest::header::USER_AGENT, agent);
	}

	let res = req.send().await.map_err(|err| FetchError::from_reqwest(url, timeout_ms, err))?;
	let status = res.status();

	if !status.is_success() {
		return Err(FetchError::HttpStatus { url: url.to_string(), status: status.as_u16() });
	}

	res.text().await.map_err(|err| FetchError::from_reqwest(url, timeout_ms, err))
}
