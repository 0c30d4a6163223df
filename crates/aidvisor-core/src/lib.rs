//! Ticketing, response caching, and latency tracking for slow generation jobs.
//!
//! Callers submit a normalized request through [`JobOrchestrator`]. A fresh
//! cached result is returned immediately; otherwise a ticket is issued and the
//! generation runs in the background, settling into the [`TicketStore`] and
//! the [`ResponseCache`].

pub mod cache;
pub mod fingerprint;
pub mod fsutil;
pub mod generation;
pub mod jobs;
pub mod latency;
pub mod reaper;
pub mod tickets;

pub use cache::{CacheError, CacheHit, ResponseCache, SweepReport};
pub use fingerprint::{fingerprint, slugify, Normalizer};
pub use generation::{GenerationError, GenerationTask, Generator};
pub use jobs::{Accepted, JobLane, JobOrchestrator, SubmitError, Submission, MALFORMED_REPLY};
pub use latency::{LatencySnapshot, LatencyStats, PersistError};
pub use tickets::{new_ticket_id, Ticket, TicketState, TicketStore};
