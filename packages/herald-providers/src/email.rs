use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::Value;

use crate::{
	channel::{self, DeliveryError},
	ical, message,
};
use herald_domain::Event;

/// Resend `POST /emails`.
#[derive(Debug, Clone)]
pub struct Resend {
	pub(crate) client: Client,
	pub(crate) api_base: String,
	pub(crate) api_key: String,
	pub(crate) from: String,
}
impl Resend {
	pub async fn send(&self, to: &str, event: &Event) -> Result<(), DeliveryError> {
		let res = self
			.client
			.post(format!("{}/emails", self.api_base))
			.bearer_auth(&self.api_key)
			.json(&resend_payload(&self.from, to, event))
			.send()
			.await
			.map_err(DeliveryError::from_reqwest)?;

		channel::check_response(res).await
	}
}

/// SendGrid `POST /v3/mail/send`.
#[derive(Debug, Clone)]
pub struct SendGrid {
	pub(crate) client: Client,
	pub(crate) api_base: String,
	pub(crate) api_key: String,
	pub(crate) from: String,
}
impl SendGrid {
	pub async fn send(&self, to: &str, event: &Event) -> Result<(), DeliveryError> {
		let res = self
			.client
			.post(format!("{}/v3/mail/send", self.api_base))
			.bearer_auth(&self.api_key)
			.json(&sendgrid_payload(&self.from, to, event))
			.send()
			.await
			.map_err(DeliveryError::from_reqwest)?;

		channel::check_response(res).await
	}
}

pub fn resend_payload(from: &str, to: &str, event: &Event) -> Value {
	serde_json::json!({
		"from": from,
		"to": [to],
		"subject": message::subject(event),
		"html": message::email_html(event),
		"text": message::email_text(event),
		"attachments": [{
			"filename": ical::filename(event),
			"content": STANDARD.encode(ical::render(event)),
			"content_type": "text/calendar",
		}],
	})
}

pub fn sendgrid_payload(from: &str, to: &str, event: &Event) -> Value {
	serde_json::json!({
		"personalizations": [{ "to": [{ "email": to }] }],
		"from": { "email": from },
		"subject": message::subject(event),
		"content": [
			{ "type": "text/plain", "value": message::email_text(event) },
			{ "type": "text/html", "value": message::email_html(event) },
		],
		"attachments": [{
			"content": STANDARD.encode(ical::render(event)),
			"filename": ical::filename(event),
			"type": "text/calendar",
			"disposition": "attachment",
		}],
	})
}
