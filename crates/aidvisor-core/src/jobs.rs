//! Job orchestration: cache check, ticket issue, detached generation, and
//! reconciliation of the result into the ticket store and the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::generation::{GenerationError, GenerationTask, Generator};
use crate::latency::LatencyStats;
use crate::reaper;
use crate::tickets::TicketStore;

/// Ticket message for replies that are not valid JSON. The raw reply is never
/// echoed back to the caller.
pub const MALFORMED_REPLY: &str = "model did not return valid JSON";

/// One class of job: its cache namespace, latency history, and deadline.
pub struct JobLane {
    pub name: &'static str,
    pub cache: Arc<ResponseCache>,
    pub latency: Arc<LatencyStats>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub id: String,
    pub avg_ms: f64,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Served from the cache; no ticket was issued.
    Cached(String),
    Accepted(Accepted),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("too many jobs in flight (limit {limit})")]
    Overloaded { limit: usize },
}

pub struct JobOrchestrator {
    tickets: Arc<TicketStore>,
    generator: Arc<dyn Generator>,
    limiter: Arc<Semaphore>,
    max_inflight: usize,
    retention: Duration,
    cancel: CancellationToken,
}

impl JobOrchestrator {
    pub fn new(
        tickets: Arc<TicketStore>,
        generator: Arc<dyn Generator>,
        max_inflight: usize,
        retention: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let max_inflight = max_inflight.max(1);
        Self {
            tickets,
            generator,
            limiter: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
            retention,
            cancel,
        }
    }

    pub fn tickets(&self) -> &Arc<TicketStore> {
        &self.tickets
    }

    pub fn in_flight(&self) -> usize {
        self.max_inflight
            .saturating_sub(self.limiter.available_permits())
    }

    /// Wait for every in-flight job to settle, giving up after `grace`.
    /// Returns false when jobs were still running at the deadline.
    pub async fn drain(&self, grace: Duration) -> bool {
        let all = u32::try_from(self.max_inflight).unwrap_or(u32::MAX);
        matches!(
            tokio::time::timeout(grace, self.limiter.acquire_many(all)).await,
            Ok(Ok(_))
        )
    }

    /// Cache read with the fail-open policy applied: every error is a miss.
    pub async fn cached(&self, lane: &JobLane, key: &str) -> Option<String> {
        match lane.cache.lookup(key).await {
            Ok(Some(hit)) => {
                debug!(
                    target: "aidvisor::jobs",
                    lane = lane.name,
                    key,
                    age_secs = hit.age.as_secs(),
                    "cache hit"
                );
                Some(hit.payload)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    target: "aidvisor::jobs",
                    lane = lane.name,
                    key,
                    error = %err,
                    "cache lookup failed; treating as miss"
                );
                None
            }
        }
    }

    /// Serve `cache_key` from the cache, or issue a ticket and run `task` in
    /// the background. Only admission control can refuse a submission.
    pub async fn submit(
        &self,
        lane: &JobLane,
        cache_key: &str,
        task: GenerationTask,
    ) -> Result<Submission, SubmitError> {
        if let Some(payload) = self.cached(lane, cache_key).await {
            return Ok(Submission::Cached(payload));
        }

        let permit = self
            .limiter
            .clone()
            .try_acquire_owned()
            .map_err(|_| {
                warn!(
                    target: "aidvisor::jobs",
                    lane = lane.name,
                    limit = self.max_inflight,
                    "job rejected; in-flight limit reached"
                );
                SubmitError::Overloaded {
                    limit: self.max_inflight,
                }
            })?;

        let id = self.tickets.issue();
        let latency = lane.latency.snapshot();
        info!(
            target: "aidvisor::jobs",
            lane = lane.name,
            id = %id,
            key = cache_key,
            samples = latency.count,
            avg_ms = latency.avg_ms,
            "job accepted"
        );

        let job = Job {
            id: id.clone(),
            cache_key: cache_key.to_string(),
            lane: lane.name,
            cache: lane.cache.clone(),
            latency: lane.latency.clone(),
            timeout: lane.timeout,
            tickets: self.tickets.clone(),
            generator: self.generator.clone(),
            retention: self.retention,
            cancel: self.cancel.clone(),
        };
        tokio::spawn(job.run(task, permit));

        Ok(Submission::Accepted(Accepted {
            id,
            avg_ms: latency.avg_ms,
            samples: latency.count,
        }))
    }
}

struct Job {
    id: String,
    cache_key: String,
    lane: &'static str,
    cache: Arc<ResponseCache>,
    latency: Arc<LatencyStats>,
    timeout: Duration,
    tickets: Arc<TicketStore>,
    generator: Arc<dyn Generator>,
    retention: Duration,
    cancel: CancellationToken,
}

impl Job {
    async fn run(self, task: GenerationTask, _permit: OwnedSemaphorePermit) {
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            res = tokio::time::timeout(self.timeout, self.generator.generate(&task, self.timeout)) => {
                res.unwrap_or(Err(GenerationError::Timeout(self.timeout)))
            }
        };
        let elapsed = started.elapsed();

        // A job that never reached the service says nothing about its latency.
        if !matches!(outcome, Err(GenerationError::MissingCredentials)) {
            if let Err(err) = self.latency.record(elapsed).await {
                warn!(
                    target: "aidvisor::jobs",
                    lane = self.lane,
                    id = %self.id,
                    error = %err,
                    "latency snapshot not persisted"
                );
            }
        }

        match outcome {
            Ok(reply) => self.settle_reply(reply, elapsed).await,
            Err(err) => {
                warn!(
                    target: "aidvisor::jobs",
                    lane = self.lane,
                    id = %self.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "job failed"
                );
                self.tickets.fail(&self.id, err.to_string());
            }
        }

        reaper::spawn_ticket_expiry(
            self.tickets.clone(),
            self.id.clone(),
            self.retention,
            self.cancel.clone(),
        );
    }

    async fn settle_reply(&self, reply: String, elapsed: Duration) {
        let reply = reply.trim();
        if serde_json::from_str::<serde::de::IgnoredAny>(reply).is_err() {
            warn!(
                target: "aidvisor::jobs",
                lane = self.lane,
                id = %self.id,
                reply_len = reply.len(),
                "generation reply is not valid JSON"
            );
            self.tickets.fail(&self.id, MALFORMED_REPLY);
            return;
        }
        // Cache before completing so a caller that saw the result can already
        // hit the cache with the same request.
        if let Err(err) = self.cache.store(&self.cache_key, reply).await {
            warn!(
                target: "aidvisor::jobs",
                lane = self.lane,
                id = %self.id,
                key = %self.cache_key,
                error = %err,
                "result not cached"
            );
        }
        self.tickets.complete(&self.id, reply.to_string());
        info!(
            target: "aidvisor::jobs",
            lane = self.lane,
            id = %self.id,
            elapsed_ms = elapsed.as_millis() as u64,
            "job complete"
        );
    }
}
