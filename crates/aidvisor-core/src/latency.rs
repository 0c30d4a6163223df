//! Running latency statistics for one operation class.
//!
//! The snapshot is persisted after every update so a crash loses at most the
//! sample in flight. In-memory updates are serialized by a short mutex; disk
//! writes are serialized separately and always write the newest snapshot, so
//! a slow writer can never overwrite a fresher file with stale numbers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode latency snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub total_ms: u64,
    pub avg_ms: f64,
}

impl LatencySnapshot {
    fn add(&mut self, elapsed_ms: u64) {
        self.count = self.count.saturating_add(1);
        self.total_ms = self.total_ms.saturating_add(elapsed_ms);
        self.avg_ms = self.total_ms as f64 / self.count as f64;
    }

    // A hand-edited or truncated file may carry an average that no longer
    // matches the totals; the totals win.
    fn reconciled(mut self) -> Self {
        self.avg_ms = if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        };
        self
    }
}

pub struct LatencyStats {
    label: &'static str,
    path: PathBuf,
    state: Mutex<LatencySnapshot>,
    persist: tokio::sync::Mutex<()>,
}

impl LatencyStats {
    /// Seed from the snapshot at `path`. Missing or unreadable history starts
    /// from zero.
    pub async fn load(label: &'static str, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seed = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<LatencySnapshot>(&bytes) {
                Ok(snapshot) => snapshot.reconciled(),
                Err(err) => {
                    warn!(
                        target: "aidvisor::latency",
                        label,
                        path = %path.display(),
                        error = %err,
                        "corrupt latency snapshot; starting from zero"
                    );
                    LatencySnapshot::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => LatencySnapshot::default(),
            Err(err) => {
                warn!(
                    target: "aidvisor::latency",
                    label,
                    path = %path.display(),
                    error = %err,
                    "latency snapshot unreadable; starting from zero"
                );
                LatencySnapshot::default()
            }
        };
        debug!(target: "aidvisor::latency", label, samples = seed.count, avg_ms = seed.avg_ms, "latency loaded");
        Self {
            label,
            path,
            state: Mutex::new(seed),
            persist: tokio::sync::Mutex::new(()),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        *self.state.lock()
    }

    /// Add one sample and persist. The returned snapshot reflects this
    /// sample; the in-memory update stands even when persistence fails.
    pub async fn record(&self, elapsed: Duration) -> Result<LatencySnapshot, PersistError> {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let after = {
            let mut state = self.state.lock();
            state.add(elapsed_ms);
            *state
        };
        debug!(
            target: "aidvisor::latency",
            label = self.label,
            elapsed_ms,
            samples = after.count,
            avg_ms = after.avg_ms,
            "latency recorded"
        );
        self.persist().await?;
        Ok(after)
    }

    async fn persist(&self) -> Result<(), PersistError> {
        let _writer = self.persist.lock().await;
        let latest = self.snapshot();
        let bytes = serde_json::to_vec_pretty(&latest)?;
        fsutil::save_bytes_atomic(&self.path, &bytes)
            .await
            .map_err(|source| PersistError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
