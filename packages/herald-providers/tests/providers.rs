use std::time::Duration;

use axum::{
	Json, Router,
	http::{HeaderMap, StatusCode},
	routing::{get, post},
};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use time::{UtcOffset, macros::datetime};
use tokio::net::TcpListener;

use herald_config::{ChannelConfig, ChannelKind, RetryConfig, Source};
use herald_domain::Event;
use herald_providers::{ChannelClient, FetchError, fetcher};

async fn serve(app: Router) -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind listener.");
	let addr = listener.local_addr().expect("Failed to read listener address.");

	tokio::spawn(async move {
		let _ = axum::serve(listener, app).await;
	});

	format!("http://{addr}")
}

fn source(url: String, timeout_ms: u64) -> Source {
	Source {
		url,
		timeout_ms,
		user_agent: None,
		retry: RetryConfig::default(),
		utc_offset: UtcOffset::UTC,
		eu_summer_time: false,
	}
}

fn channel(kind: ChannelKind, api_base: String) -> ChannelConfig {
	ChannelConfig {
		name: kind.as_str().to_string(),
		kind,
		target: "ops@herald.test".to_string(),
		api_key: "secret".to_string(),
		api_base: Some(api_base),
		from: Some("events@herald.test".to_string()),
		timeout_ms: 1_000,
		enabled: true,
	}
}

fn event() -> Event {
	Event {
		identity_key: "0123456789abcdef".to_string(),
		title: "PyData Meetup".to_string(),
		start_time: datetime!(2025-03-01 18:00 UTC),
		end_time: None,
		location: Some("Prague".to_string()),
		source_url: "https://datatalk.cz/akce/pydata".to_string(),
		description: None,
		summary: None,
		content_hash: "hash".to_string(),
		first_seen_at: datetime!(2025-02-01 08:00 UTC),
		last_seen_at: datetime!(2025-02-01 08:00 UTC),
		last_changed_at: datetime!(2025-02-01 08:00 UTC),
	}
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		herald_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut headers = Map::new();

	headers.insert("x-retries".to_string(), Value::from(3));

	assert!(herald_providers::auth_headers("secret", &headers).is_err());
}

#[tokio::test]
async fn fetch_returns_listing_body() {
	let base =
		serve(Router::new().route("/akce", get(|| async { "<article>PyData</article>" }))).await;
	let body = fetcher::fetch(&source(format!("{base}/akce"), 1_000))
		.await
		.expect("Failed to fetch listing.");

	assert_eq!(body, "<article>PyData</article>");
}

#[tokio::test]
async fn detail_pages_are_fetched_with_the_configured_agent() {
	let app = Router::new().route(
		"/akce/pydata",
		get(|headers: HeaderMap| async move {
			headers
				.get(axum::http::header::USER_AGENT)
				.and_then(|agent| agent.to_str().ok())
				.unwrap_or_default()
				.to_string()
		}),
	);
	let base = serve(app).await;
	let body = fetcher::fetch_page(&format!("{base}/akce/pydata"), Some("herald-test"), 1_000)
		.await
		.expect("Failed to fetch detail page.");

	assert_eq!(body, "herald-test");
}

#[tokio::test]
async fn fetch_maps_status_and_timeout() {
	let app = Router::new()
		.route("/missing", get(|| async { (StatusCode::NOT_FOUND, "gone") }))
		.route(
			"/slow",
			get(|| async {
				tokio::time::sleep(Duration::from_millis(500)).await;

				"late"
			}),
		);
	let base = serve(app).await;
	let missing = fetcher::fetch(&source(format!("{base}/missing"), 1_000))
		.await
		.expect_err("Expected status error.");
	let slow = fetcher::fetch(&source(format!("{base}/slow"), 50))
		.await
		.expect_err("Expected timeout.");

	assert!(matches!(missing, FetchError::HttpStatus { status: 404, .. }));
	assert!(!missing.is_retryable());
	assert!(matches!(slow, FetchError::Timeout { timeout_ms: 50, .. }));
	assert!(slow.is_retryable());
}

#[tokio::test]
async fn resend_accepts_success_and_rejects_invalid_recipient() {
	let ok = serve(
		Router::new().route("/emails", post(|| async { Json(serde_json::json!({ "id": "1" })) })),
	)
	.await;
	let invalid = serve(Router::new().route(
		"/emails",
		post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "Invalid `to` field.") }),
	))
	.await;
	let sender = ChannelClient::from_config(&channel(ChannelKind::Resend, ok))
		.expect("Failed to build channel.");
	let rejecting = ChannelClient::from_config(&channel(ChannelKind::Resend, invalid))
		.expect("Failed to build channel.");

	sender.send("ops@herald.test", &event()).await.expect("Expected delivery.");

	let err = rejecting.send("ops@herald.test", &event()).await.expect_err("Expected rejection.");

	assert!(!err.is_retryable());
	assert!(err.message().contains("422"));
}

#[tokio::test]
async fn telegram_rate_limit_is_retryable() {
	let base = serve(Router::new().route(
		"/{token}/sendMessage",
		post(|| async {
			(
				StatusCode::TOO_MANY_REQUESTS,
				Json(serde_json::json!({
					"ok": false,
					"error_code": 429,
					"description": "Too Many Requests: retry after 5",
				})),
			)
		}),
	))
	.await;
	let bot = ChannelClient::from_config(&channel(ChannelKind::Telegram, base))
		.expect("Failed to build channel.");
	let err = bot.send("-1001", &event()).await.expect_err("Expected rate limit.");

	assert!(err.is_retryable());
	assert!(err.message().contains("Too Many Requests"));
}
