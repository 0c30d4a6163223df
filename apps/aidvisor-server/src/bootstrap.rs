use std::sync::Arc;

use aidvisor_core::{
    reaper, Generator, JobLane, JobOrchestrator, LatencyStats, ResponseCache, TicketStore,
};
use anyhow::Context as _;
use axum::{extract::DefaultBodyLimit, middleware};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::ServerConfig, cors, generation::OpenAiGenerator, http_client, router, secrets,
    tasks::TaskManager, AppState,
};

pub(crate) struct BootstrapOutput {
    pub router: axum::Router<AppState>,
    pub state: AppState,
    pub background_tasks: TaskManager,
}

/// Wire the production generator from config and secrets, then build.
pub(crate) async fn build(config: ServerConfig) -> anyhow::Result<BootstrapOutput> {
    let api_key = secrets::load_api_key(&config.secrets_path());
    if api_key.is_none() {
        warn!(
            target: "aidvisor::bootstrap",
            path = %config.secrets_path().display(),
            "no OpenAI API key configured; jobs will fail until one is provided"
        );
    }
    let client = http_client::client(&config).context("build upstream HTTP client")?;
    let generator = OpenAiGenerator::new(
        client,
        &config.openai_base_url,
        config.openai_model.clone(),
        api_key,
    );
    Ok(build_with_generator(config, Arc::new(generator)).await)
}

pub(crate) async fn build_with_generator(
    config: ServerConfig,
    generator: Arc<dyn Generator>,
) -> BootstrapOutput {
    let shutdown = CancellationToken::new();

    let advisor_cache = Arc::new(ResponseCache::new(
        "advisor",
        config.response_cache_dir(),
        config.cache_ttl(),
    ));
    let details_cache = Arc::new(ResponseCache::new(
        "details",
        config.details_cache_dir(),
        config.cache_ttl(),
    ));
    let advisor = Arc::new(JobLane {
        name: "advisor",
        cache: advisor_cache.clone(),
        latency: Arc::new(LatencyStats::load("advisor", config.advisor_latency_path()).await),
        timeout: config.advisor_timeout(),
    });
    let details = Arc::new(JobLane {
        name: "details",
        cache: details_cache.clone(),
        latency: Arc::new(LatencyStats::load("details", config.details_latency_path()).await),
        timeout: config.details_timeout(),
    });

    let jobs = Arc::new(JobOrchestrator::new(
        Arc::new(TicketStore::new()),
        generator,
        config.max_inflight_jobs,
        config.ticket_retention(),
        shutdown.clone(),
    ));

    let mut background_tasks = TaskManager::new();
    for cache in [advisor_cache, details_cache] {
        let name = format!("cache-reaper:{}", cache.namespace());
        if let Some(handle) =
            reaper::spawn_cache_reaper(cache, config.cache_sweep_period(), shutdown.clone())
        {
            background_tasks.push_handle(name, handle);
        }
    }

    info!(
        target: "aidvisor::bootstrap",
        advisor_samples = advisor.latency.snapshot().count,
        details_samples = details.latency.snapshot().count,
        max_inflight = config.max_inflight_jobs,
        "state ready"
    );

    let state = AppState::new(Arc::new(config), jobs, advisor, details, shutdown);
    BootstrapOutput {
        router: router::build_router(),
        state,
        background_tasks,
    }
}

/// Bind state and wrap the router in body limits, tracing, and CORS.
/// Outermost layer last.
pub(crate) fn attach_http_layers(
    router: axum::Router<AppState>,
    state: AppState,
) -> axum::Router<()> {
    use tower_http::trace::TraceLayer;

    let config = state.config();
    let max_body = config.max_body_bytes;
    let cors = cors::layer(&config.allowed_origins);
    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(cors::preflight_no_content))
}
