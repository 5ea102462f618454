pub mod channel;
pub mod email;
pub mod fetcher;
pub mod ical;
pub mod message;
pub mod summary;
pub mod telegram;

mod error;

pub use channel::{ChannelClient, DeliveryError};
pub use error::{Error, Result};
pub use fetcher::FetchError;

use std::time::Duration;

use reqwest::{
	Client, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

pub const USER_AGENT: &str = concat!("herald/", env!("CARGO_PKG_VERSION"));

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// 408, 429, and 5xx responses are worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
	status == StatusCode::REQUEST_TIMEOUT
		|| status == StatusCode::TOO_MANY_REQUESTS
		|| status.is_server_error()
}

pub(crate) fn http_client(timeout_ms: u64) -> reqwest::Result<Client> {
	Client::builder().timeout(Duration::from_millis(timeout_ms)).user_agent(USER_AGENT).build()
}
