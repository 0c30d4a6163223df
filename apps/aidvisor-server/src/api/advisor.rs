//! Recommendation submission and polling.

use aidvisor_core::{Submission, TicketState};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{advisor::AdvisorRequest, json_errors::decode_error_detail, AppState};

#[derive(Debug, Default, Deserialize)]
struct FetchRequest {
    #[serde(default)]
    id: String,
}

/// `POST /CollegeAdvisor`: validate the profile, answer from the cache, or
/// queue a recommendation job and hand back its ticket.
pub async fn advisor_submit(State(state): State<AppState>, body: Bytes) -> Response {
    let request: AdvisorRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!(target: "aidvisor::http", error = %err, "advisor body rejected");
            return super::json_error(
                StatusCode::BAD_REQUEST,
                json!({"invalid_fields": {"_": decode_error_detail(&err, &body)}}),
            );
        }
    };

    let invalid = request.validate();
    if !invalid.is_empty() {
        info!(
            target: "aidvisor::http",
            fields = invalid.len(),
            "advisor request failed validation"
        );
        return super::json_error(StatusCode::BAD_REQUEST, json!({"invalid_fields": invalid}));
    }

    let key = request.fingerprint();
    match state
        .jobs()
        .submit(state.advisor_lane(), &key, request.task())
        .await
    {
        Ok(Submission::Cached(payload)) => Json(json!({"success": payload})).into_response(),
        Ok(Submission::Accepted(accepted)) => super::accepted(&accepted),
        Err(err) => super::overloaded(&err),
    }
}

/// `POST /CollegeFetch`: report a ticket's state. A settled ticket is
/// handed out once and then forgotten.
pub async fn advisor_fetch(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.iter().all(|b| b.is_ascii_whitespace()) {
        FetchRequest::default()
    } else {
        match serde_json::from_slice::<FetchRequest>(&body) {
            Ok(request) => request,
            Err(err) => {
                return Json(json!({"error": format!("invalid JSON: {err}")})).into_response();
            }
        }
    };

    let invalid_id = || super::json_error(StatusCode::BAD_REQUEST, json!({"error": "invalid ID"}));
    if request.id.is_empty() {
        return invalid_id();
    }
    let success = match state.tickets().collect(&request.id) {
        None => return invalid_id(),
        Some(TicketState::Processing) => json!("Processing"),
        Some(TicketState::Done(payload)) => json!(payload),
        Some(TicketState::Failed(message)) => json!(json!({"error": message}).to_string()),
    };
    Json(json!({"success": success})).into_response()
}
