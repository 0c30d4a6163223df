//! Browser access from the configured front-end origins.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::warn;

/// Exact-match origin allow-list. Unknown origins get no CORS headers at all.
pub(crate) fn layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(target: "aidvisor::http", origin = %origin, error = %err, "ignoring unusable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
}

/// Every OPTIONS request is answered with an empty 204, keeping whatever
/// CORS headers the layer below attached.
pub(crate) async fn preflight_no_content(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }
    let (mut parts, _body) = next.run(req).await.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(header::CONTENT_TYPE);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::Request as HttpRequest, middleware, routing::post, Router};
    use tower::util::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/x", post(|| async { "posted" }))
            .layer(layer(&["https://app.example".to_string()]))
            .layer(middleware::from_fn(preflight_no_content))
    }

    #[tokio::test]
    async fn allowed_origin_preflight() {
        let resp = app()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::OPTIONS)
                    .uri("/x")
                    .header("origin", "https://app.example")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "content-type,x-trace")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let headers = resp.headers();
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "https://app.example"
        );
        let methods = headers
            .get("access-control-allow-methods")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(methods.contains("POST") && methods.contains("GET"));
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "content-type,x-trace"
        );
        assert!(headers.get("vary").is_some());
    }

    #[tokio::test]
    async fn bare_options_is_no_content() {
        let resp = app()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::OPTIONS)
                    .uri("/x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unknown_origin_gets_no_cors_headers() {
        let resp = app()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::POST)
                    .uri("/x")
                    .header("origin", "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }
}
