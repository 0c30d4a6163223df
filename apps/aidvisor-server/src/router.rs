use axum::{
    routing::{get, post},
    Router,
};

use crate::{api, AppState};

pub(crate) mod paths {
    pub const ADVISOR: &str = "/CollegeAdvisor";
    pub const FETCH: &str = "/CollegeFetch";
    pub const DETAILS: &str = "/CollegeAdvisorDetails";
    pub const DETAILS_STATUS: &str = "/CollegeAdvisorDetailsStatus";
    pub const HEALTHZ: &str = "/healthz";
}

/// Routes without layers; methods outside each route's verb get a JSON 405.
pub(crate) fn build_router() -> Router<AppState> {
    Router::new()
        .route(
            paths::ADVISOR,
            post(api::advisor::advisor_submit).fallback(api::meta::method_not_allowed),
        )
        .route(
            paths::FETCH,
            post(api::advisor::advisor_fetch).fallback(api::meta::method_not_allowed),
        )
        .route(
            paths::DETAILS,
            post(api::details::details_submit).fallback(api::meta::method_not_allowed),
        )
        .route(
            paths::DETAILS_STATUS,
            get(api::details::details_status).fallback(api::meta::method_not_allowed),
        )
        .route(paths::HEALTHZ, get(api::meta::healthz))
}
