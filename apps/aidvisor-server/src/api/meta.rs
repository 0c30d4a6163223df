use axum::{http::StatusCode, response::Response};
use serde_json::json;

/// Liveness probe.
pub async fn healthz() -> &'static str {
    "ok\n"
}

pub async fn method_not_allowed() -> Response {
    super::json_error(
        StatusCode::METHOD_NOT_ALLOWED,
        json!({"error": "method not allowed"}),
    )
}
