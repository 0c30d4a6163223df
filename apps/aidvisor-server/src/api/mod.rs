pub mod advisor;
pub mod details;
pub mod meta;

use aidvisor_core::{Accepted, SubmitError};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

pub(crate) fn json_error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Body returned when a job was queued: the ticket plus the lane's running
/// average so clients can size their progress indicator.
pub(crate) fn accepted(a: &Accepted) -> Response {
    Json(json!({
        "id": a.id,
        "avg_chatgpt_ms": a.avg_ms,
        "samples": a.samples,
    }))
    .into_response()
}

pub(crate) fn overloaded(err: &SubmitError) -> Response {
    match err {
        SubmitError::Overloaded { limit } => json_error(
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "error": "too many requests in progress; try again shortly",
                "limit": limit,
            }),
        ),
    }
}

/// Already-serialized JSON, written through without re-encoding.
pub(crate) fn raw_json(payload: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        payload,
    )
        .into_response()
}
