//! Per-college deep dive submission and status.

use aidvisor_core::{Submission, TicketState, MALFORMED_REPLY};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{details, details::DetailsRequest, json_errors::decode_error_detail, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    id: String,
}

/// `POST /CollegeAdvisorDetails`
pub async fn details_submit(State(state): State<AppState>, body: Bytes) -> Response {
    let request: DetailsRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!(target: "aidvisor::http", error = %err, "details body rejected");
            return super::json_error(
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "invalid json",
                    "invalid_fields": {"_": decode_error_detail(&err, &body)},
                }),
            );
        }
    };
    let Some(school) = request.school_name() else {
        return super::json_error(
            StatusCode::BAD_REQUEST,
            json!({"error": "missing 'school' name"}),
        );
    };

    let key = details::cache_key(school);
    let task = details::task(school, request.profile.as_ref());
    match state.jobs().submit(state.details_lane(), &key, task).await {
        Ok(Submission::Cached(payload)) => super::raw_json(payload),
        Ok(Submission::Accepted(accepted)) => super::accepted(&accepted),
        Err(err) => super::overloaded(&err),
    }
}

/// `GET /CollegeAdvisorDetailsStatus?id=...`
pub async fn details_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let id = query.id.trim();
    if id.is_empty() {
        return super::json_error(StatusCode::BAD_REQUEST, json!({"error": "missing id"}));
    }
    let body = match state.tickets().collect(id) {
        None => {
            return super::json_error(StatusCode::NOT_FOUND, json!({"error": "not found"}));
        }
        Some(TicketState::Processing) => json!({"status": "processing"}),
        Some(TicketState::Done(payload)) => match serde_json::from_str::<Value>(&payload) {
            Ok(data) => json!({"status": "done", "data": data}),
            Err(err) => {
                warn!(target: "aidvisor::http", id, error = %err, "stored result is not JSON");
                json!({"status": "error", "message": MALFORMED_REPLY})
            }
        },
        Some(TicketState::Failed(message)) => json!({"status": "error", "message": message}),
    };
    Json(body).into_response()
}
