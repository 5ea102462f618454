use reqwest::Client;
use serde_json::Value;

use crate::{channel::DeliveryError, message};
use herald_domain::Event;

/// Telegram Bot API `sendMessage`. `api_key` is the bot token.
#[derive(Debug, Clone)]
pub struct Telegram {
	pub(crate) client: Client,
	pub(crate) api_base: String,
	pub(crate) api_key: String,
}
impl Telegram {
	pub async fn send(&self, chat_id: &str, event: &Event) -> Result<(), DeliveryError> {
		let url = format!("{}/bot{}/sendMessage", self.api_base, self.api_key);
		let body = serde_json::json!({
			"chat_id": chat_id,
			"text": message::telegram_html(event),
			"parse_mode": "HTML",
			"disable_web_page_preview": true,
		});
		// The token is part of the URL; keep it out of error text.
		let res = self
			.client
			.post(url)
			.json(&body)
			.send()
			.await
			.map_err(|err| DeliveryError::from_reqwest(err.without_url()))?;
		let status = res.status();
		let json: Value = res.json().await.unwrap_or(Value::Null);

		if status.is_success() && json.get("ok").and_then(Value::as_bool).unwrap_or(true) {
			return Ok(());
		}

		Err(DeliveryError::from_status(status, &describe_error(&json)))
	}
}

/// Pulls `description` out of a Bot API error body.
pub fn describe_error(json: &Value) -> String {
	json.get("description").and_then(Value::as_str).unwrap_or_default().to_string()
}
