use std::sync::Arc;

use aidvisor_core::{JobLane, JobOrchestrator, TicketStore};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

#[derive(Clone)]
pub(crate) struct AppState {
    config: Arc<ServerConfig>,
    jobs: Arc<JobOrchestrator>,
    advisor: Arc<JobLane>,
    details: Arc<JobLane>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        jobs: Arc<JobOrchestrator>,
        advisor: Arc<JobLane>,
        details: Arc<JobLane>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            jobs,
            advisor,
            details,
            shutdown,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobOrchestrator {
        &self.jobs
    }

    pub fn tickets(&self) -> &TicketStore {
        self.jobs.tickets()
    }

    pub fn advisor_lane(&self) -> &JobLane {
        &self.advisor
    }

    pub fn details_lane(&self) -> &JobLane {
        &self.details
    }

    /// Cancelled once the listener has drained; in-flight jobs and pending
    /// ticket expiries watch it.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
