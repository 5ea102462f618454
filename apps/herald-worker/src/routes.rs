use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use herald_domain::{Event, PipelineRun, RunTrigger};
use herald_providers::ical;
use herald_service::TriggerOutcome;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 200;

/// Loopback-only operator surface.
pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/admin/runs", post(trigger_run).get(list_runs))
		.route("/v1/admin/runs/cancel", post(cancel_run))
		.route("/v1/events", get(list_events))
		.route("/v1/events/{identity_key}/ical", get(event_ical))
		.with_state(state)
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
	pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
	pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
	pub limit: Option<u32>,
}
impl LimitQuery {
	fn checked(&self) -> Result<u32, ApiError> {
		let limit = self.limit.unwrap_or(DEFAULT_LIMIT);

		if limit == 0 || limit > MAX_LIMIT {
			return Err(json_error(
				StatusCode::BAD_REQUEST,
				"invalid_request",
				format!("limit must be between 1 and {MAX_LIMIT}."),
				Some(vec!["$.limit".to_string()]),
			));
		}

		Ok(limit)
	}
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn trigger_run(State(state): State<AppState>) -> (StatusCode, Json<TriggerResponse>) {
	let outcome = state.coordinator.trigger(RunTrigger::Manual);
	let status = match outcome {
		TriggerOutcome::Started | TriggerOutcome::Queued => StatusCode::ACCEPTED,
		TriggerOutcome::Dropped => StatusCode::CONFLICT,
	};

	tracing::info!(outcome = outcome.as_str(), "Manual run requested.");

	(status, Json(TriggerResponse { status: outcome.as_str() }))
}

async fn cancel_run(State(state): State<AppState>) -> Json<CancelResponse> {
	Json(CancelResponse { cancelled: state.coordinator.cancel_current() })
}

async fn list_runs(
	State(state): State<AppState>,
	Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<PipelineRun>>, ApiError> {
	let runs = state.store().recent_runs(query.checked()?).await?;

	Ok(Json(runs))
}

async fn list_events(
	State(state): State<AppState>,
	Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
	let events = state.store().recent_events(query.checked()?).await?;

	Ok(Json(events))
}

async fn event_ical(
	State(state): State<AppState>,
	Path(identity_key): Path<String>,
) -> Result<Response, ApiError> {
	let Some(event) = state.store().get_by_identity(&identity_key).await? else {
		return Err(json_error(StatusCode::NOT_FOUND, "not_found", "Event not found.", None));
	};
	let disposition = format!("attachment; filename=\"{}\"", ical::filename(&event));
	let headers = [
		(header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
		(header::CONTENT_DISPOSITION, disposition),
	];

	Ok((headers, ical::render(&event)).into_response())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<herald_storage::Error> for ApiError {
	fn from(err: herald_storage::Error) -> Self {
		tracing::error!(error = %err, "Storage request failed.");

		json_error(
			StatusCode::INTERNAL_SERVER_ERROR,
			"storage_error",
			"Failed to read from storage.",
			None,
		)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
