//! In-memory ticket store.
//!
//! Every accepted job gets an opaque ticket id. The background job moves the
//! ticket from `Processing` to a terminal state exactly once; pollers read it
//! and the store drops it once that outcome has been delivered.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use tracing::debug;

const TICKET_ID_BYTES: usize = 12;

/// Fresh ticket id: 96 random bits from the thread-local CSPRNG, hex-encoded.
pub fn new_ticket_id() -> String {
    let mut raw = [0u8; TICKET_ID_BYTES];
    rand::rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketState {
    Processing,
    Done(String),
    Failed(String),
}

impl TicketState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketState::Processing)
    }
}

#[derive(Debug, Clone)]
pub struct Ticket {
    pub state: TicketState,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct TicketStore {
    inner: RwLock<HashMap<String, Ticket>>,
}

impl TicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `id` in the `Processing` state.
    pub fn create(&self, id: &str) {
        let ticket = Ticket {
            state: TicketState::Processing,
            created_at: Utc::now(),
        };
        self.inner.write().insert(id.to_string(), ticket);
        debug!(target: "aidvisor::tickets", id, "ticket created");
    }

    /// Generate a fresh id and create it.
    pub fn issue(&self) -> String {
        let id = new_ticket_id();
        self.create(&id);
        id
    }

    pub fn complete(&self, id: &str, payload: String) {
        self.transition(id, TicketState::Done(payload));
    }

    pub fn fail(&self, id: &str, message: impl Into<String>) {
        self.transition(id, TicketState::Failed(message.into()));
    }

    // Terminal writes overwrite unconditionally and keep the creation time.
    fn transition(&self, id: &str, state: TicketState) {
        let mut guard = self.inner.write();
        let created_at = guard
            .get(id)
            .map(|t| t.created_at)
            .unwrap_or_else(Utc::now);
        debug!(
            target: "aidvisor::tickets",
            id,
            done = matches!(state, TicketState::Done(_)),
            "ticket settled"
        );
        guard.insert(id.to_string(), Ticket { state, created_at });
    }

    pub fn get(&self, id: &str) -> Option<TicketState> {
        self.inner.read().get(id).map(|t| t.state.clone())
    }

    pub fn ticket(&self, id: &str) -> Option<Ticket> {
        self.inner.read().get(id).cloned()
    }

    /// Returns true when a ticket was removed.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.inner.write().remove(id).is_some();
        if removed {
            debug!(target: "aidvisor::tickets", id, "ticket deleted");
        }
        removed
    }

    /// Read the ticket for a poller. A settled ticket is removed in the same
    /// critical section, so exactly one poller receives the outcome.
    pub fn collect(&self, id: &str) -> Option<TicketState> {
        let mut guard = self.inner.write();
        let state = guard.get(id).map(|t| t.state.clone())?;
        if state.is_terminal() {
            guard.remove(id);
            debug!(target: "aidvisor::tickets", id, "outcome delivered; ticket removed");
        }
        Some(state)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
