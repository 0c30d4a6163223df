use std::time::Duration;
use tracing::{error, info, warn};

mod advisor;
mod api;
mod app_state;
mod bootstrap;
mod config;
mod cors;
mod details;
mod generation;
mod http_client;
mod json_errors;
mod router;
mod secrets;
mod tasks;
#[cfg(test)]
mod test_support;

pub(crate) use app_state::AppState;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    aidvisor_telemetry::init();

    let config = match config::ServerConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    let addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    let bootstrap::BootstrapOutput {
        router,
        state,
        background_tasks,
    } = match bootstrap::build(config).await {
        Ok(output) => output,
        Err(err) => {
            error!("startup failed: {err:#}");
            std::process::exit(1);
        }
    };

    let app = bootstrap::attach_http_layers(router, state.clone());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, "failed to bind server socket: {err}");
            std::process::exit(1);
        }
    };
    info!(%addr, "aidvisor listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }

    info!("cancelling in-flight jobs");
    state.shutdown_token().cancel();
    if !state.jobs().drain(SHUTDOWN_GRACE).await {
        warn!(
            in_flight = state.jobs().in_flight(),
            "jobs still running after shutdown grace"
        );
    }

    info!("shutting down background tasks");
    background_tasks.shutdown_with_grace(SHUTDOWN_GRACE).await;
}

async fn shutdown_signal() {
    info!("shutdown signal listener active");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!("SIGTERM handler unavailable: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
