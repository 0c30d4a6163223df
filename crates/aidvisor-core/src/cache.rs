//! Disk-backed response cache.
//!
//! One JSON file per entry (`<dir>/<key>.json`) holding `{timestamp, payload}`.
//! Entries are immutable once written: `store` stages a file and renames it
//! into place, so a reader sees either no entry, the old entry, or the new
//! entry. Expiry is time-based; readers drop stale entries lazily and the
//! reaper sweeps the directory periodically.
//!
//! Writes and deletes of one key are serialized by a striped lock; a delete
//! re-reads the entry under that lock, so it never removes a file that a
//! concurrent `store` has just renamed into place. Reads stay lock-free.
//!
//! The API returns `Result` everywhere. Callers decide the failure policy; the
//! job orchestrator treats every error as a miss (lookup) or a skipped write
//! (store).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::fsutil;

const MAX_KEY_LEN: usize = 128;
const LOCK_STRIPES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),
    #[error("refusing to cache invalid JSON: {0}")]
    InvalidPayload(#[source] serde_json::Error),
    #[error("cache io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    /// Unix seconds at which the entry was stored.
    timestamp: i64,
    payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub payload: String,
    pub age: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub errors: usize,
}

pub struct ResponseCache {
    namespace: String,
    dir: PathBuf,
    ttl: Duration,
    reaper_claimed: AtomicBool,
    key_locks: Box<[Mutex<()>]>,
}

/// What a reader found in an entry file.
enum EntryState {
    Live(CacheRecord),
    Corrupt,
    InvalidPayload,
    Expired,
}

impl ResponseCache {
    pub fn new(namespace: impl Into<String>, dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            dir: dir.into(),
            ttl,
            reaper_claimed: AtomicBool::new(false),
            key_locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// One-time gate for the periodic sweeper of this namespace. Returns true
    /// exactly once for the life of the cache instance.
    pub fn claim_reaper(&self) -> bool {
        self.reaper_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key.len() <= MAX_KEY_LEN
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn is_expired(&self, stored_at: i64) -> bool {
        age_of(stored_at) > self.ttl
    }

    fn key_lock(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.key_locks[(hasher.finish() as usize) % self.key_locks.len()]
    }

    fn classify(&self, bytes: &[u8]) -> EntryState {
        let record: CacheRecord = match serde_json::from_slice(bytes) {
            Ok(record) => record,
            Err(_) => return EntryState::Corrupt,
        };
        if serde_json::from_str::<serde::de::IgnoredAny>(&record.payload).is_err() {
            return EntryState::InvalidPayload;
        }
        if self.is_expired(record.timestamp) {
            return EntryState::Expired;
        }
        EntryState::Live(record)
    }

    /// Re-read `path` under the lock for `key` and remove it only if `stale`
    /// still holds for what is on disk now. Returns true when a file was
    /// removed.
    async fn remove_if_stale(
        &self,
        key: &str,
        path: &Path,
        stale: impl Fn(&[u8], &std::fs::Metadata) -> bool,
    ) -> std::io::Result<bool> {
        let _guard = self.key_lock(key).lock().await;
        let meta = match fs::metadata(path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if !stale(&bytes, &meta) {
            return Ok(false);
        }
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Read the entry for `key`. Missing, expired, and unparseable entries are
    /// all `Ok(None)`; expired and corrupt files are removed on the way out.
    pub async fn lookup(&self, key: &str) -> Result<Option<CacheHit>, CacheError> {
        let path = self.entry_path(key)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(&path, err)),
        };
        match self.classify(&bytes) {
            EntryState::Live(record) => {
                return Ok(Some(CacheHit {
                    age: age_of(record.timestamp),
                    payload: record.payload,
                }))
            }
            EntryState::Corrupt => warn!(
                target: "aidvisor::cache",
                namespace = %self.namespace,
                key,
                "corrupt cache entry; treating as miss"
            ),
            EntryState::InvalidPayload => warn!(
                target: "aidvisor::cache",
                namespace = %self.namespace,
                key,
                "cached payload is not valid JSON; treating as miss"
            ),
            EntryState::Expired => {
                debug!(target: "aidvisor::cache", namespace = %self.namespace, key, "expired entry")
            }
        }
        self.remove_if_stale(key, &path, |bytes, _| {
            !matches!(self.classify(bytes), EntryState::Live(_))
        })
        .await
        .map_err(|err| CacheError::io(&path, err))?;
        Ok(None)
    }

    /// Persist `payload` under `key`, replacing any previous entry. Payloads
    /// that are not valid JSON are rejected before anything touches disk.
    pub async fn store(&self, key: &str, payload: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        serde_json::from_str::<serde::de::IgnoredAny>(payload)
            .map_err(CacheError::InvalidPayload)?;
        let record = CacheRecord {
            timestamp: chrono::Utc::now().timestamp(),
            payload: payload.to_string(),
        };
        let bytes = serde_json::to_vec_pretty(&record).map_err(CacheError::InvalidPayload)?;
        {
            let _guard = self.key_lock(key).lock().await;
            fsutil::save_bytes_atomic(&path, &bytes)
                .await
                .map_err(|err| CacheError::io(&path, err))?;
        }
        debug!(
            target: "aidvisor::cache",
            namespace = %self.namespace,
            key,
            bytes = bytes.len(),
            "stored entry"
        );
        Ok(())
    }

    /// Remove every entry older than the TTL. A missing directory is an empty
    /// sweep; per-entry failures are logged and counted, never fatal.
    pub async fn sweep(&self) -> Result<SweepReport, CacheError> {
        let mut report = SweepReport::default();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(report),
            Err(err) => return Err(CacheError::io(&self.dir, err)),
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        target: "aidvisor::cache",
                        namespace = %self.namespace,
                        error = %err,
                        "cache directory listing interrupted"
                    );
                    report.errors += 1;
                    break;
                }
            };
            let path = entry.path();
            match self.sweep_entry(&path).await {
                Ok(Some(removed)) => {
                    report.scanned += 1;
                    if removed {
                        report.removed += 1;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    report.scanned += 1;
                    report.errors += 1;
                    warn!(
                        target: "aidvisor::cache",
                        namespace = %self.namespace,
                        path = %path.display(),
                        error = %err,
                        "cache sweep entry failed"
                    );
                }
            }
        }
        Ok(report)
    }

    /// `Ok(None)` for entries the sweep ignores (directories, foreign files).
    async fn sweep_entry(&self, path: &Path) -> std::io::Result<Option<bool>> {
        let meta = fs::metadata(path).await?;
        if meta.is_dir() {
            return Ok(None);
        }
        if fsutil::is_staging_file(path) {
            if modified_age(&meta) <= self.ttl {
                return Ok(Some(false));
            }
            return match fs::remove_file(path).await {
                Ok(()) => Ok(Some(true)),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(Some(false)),
                Err(err) => Err(err),
            };
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Ok(None);
        }
        let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
            return Ok(None);
        };
        let removed = self
            .remove_if_stale(key, path, |bytes, meta| {
                match serde_json::from_slice::<CacheRecord>(bytes) {
                    Ok(record) => self.is_expired(record.timestamp),
                    Err(_) => modified_age(meta) > self.ttl,
                }
            })
            .await?;
        Ok(Some(removed))
    }
}

fn age_of(stored_at: i64) -> Duration {
    let now = chrono::Utc::now().timestamp();
    Duration::from_secs(now.saturating_sub(stored_at).max(0) as u64)
}

fn modified_age(meta: &std::fs::Metadata) -> Duration {
    meta.modified()
        .ok()
        .and_then(|ts| SystemTime::now().duration_since(ts).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn write_record(dir: &Path, key: &str, age_secs: i64, payload: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let record = json!({
            "timestamp": chrono::Utc::now().timestamp() - age_secs,
            "payload": payload,
        });
        std::fs::write(dir.join(format!("{key}.json")), record.to_string()).unwrap();
    }

    #[tokio::test]
    async fn store_then_lookup_returns_payload() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("advisor", tmp.path().join("responses"), WEEK);
        let payload = r#"{"schools":[{"name":"Rice","chance_percent":40}]}"#;
        cache.store("abc123", payload).await.expect("store");
        let hit = cache.lookup("abc123").await.expect("lookup").expect("hit");
        assert_eq!(hit.payload, payload);
        assert!(hit.age < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn lookup_of_missing_entry_is_a_miss() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("advisor", tmp.path().join("never-created"), WEEK);
        assert!(cache.lookup("deadbeef").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn store_overwrites_existing_entry() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("details", tmp.path(), WEEK);
        cache.store("rice_university", r#"{"v":1}"#).await.unwrap();
        cache.store("rice_university", r#"{"v":2}"#).await.unwrap();
        let hit = cache.lookup("rice_university").await.unwrap().unwrap();
        assert_eq!(hit.payload, r#"{"v":2}"#);
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_disk() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("advisor", tmp.path(), WEEK);
        cache.store("k1", r#"{"ok":true}"#).await.unwrap();
        let err = cache.store("k1", "Sure! Here are some schools").await;
        assert!(matches!(err, Err(CacheError::InvalidPayload(_))));
        let err = cache.store("k2", "{truncated").await;
        assert!(matches!(err, Err(CacheError::InvalidPayload(_))));

        let hit = cache.lookup("k1").await.unwrap().unwrap();
        assert_eq!(hit.payload, r#"{"ok":true}"#);
        assert!(!tmp.path().join("k2.json").exists());
    }

    #[tokio::test]
    async fn keys_with_path_components_are_rejected() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("details", tmp.path(), WEEK);
        assert!(matches!(
            cache.store("../escape", "{}").await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            cache.lookup("").await,
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_removed() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("advisor", tmp.path(), WEEK);
        let stale_age = WEEK.as_secs() as i64 + 60;
        write_record(tmp.path(), "old", stale_age, r#"{"schools":[]}"#);
        assert!(tmp.path().join("old.json").exists());
        assert!(cache.lookup("old").await.unwrap().is_none());
        assert!(!tmp.path().join("old.json").exists());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("advisor", tmp.path(), WEEK);
        std::fs::write(tmp.path().join("broken.json"), b"{\"timestamp\": 17").unwrap();
        assert!(cache.lookup("broken").await.unwrap().is_none());
        write_record(tmp.path(), "notjson", 10, "plain words");
        assert!(cache.lookup("notjson").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("advisor", tmp.path(), WEEK);
        write_record(tmp.path(), "fresh", 60, "{}");
        write_record(tmp.path(), "stale", WEEK.as_secs() as i64 * 2, "{}");
        std::fs::write(tmp.path().join("README.txt"), b"not a cache file").unwrap();
        std::fs::create_dir_all(tmp.path().join("subdir")).unwrap();

        let report = cache.sweep().await.expect("sweep");
        assert_eq!(report.removed, 1);
        assert_eq!(report.errors, 0);
        assert!(tmp.path().join("fresh.json").exists());
        assert!(!tmp.path().join("stale.json").exists());
        assert!(tmp.path().join("README.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sweep_counts_unreadable_entry_and_continues() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("advisor", tmp.path(), WEEK);
        write_record(tmp.path(), "fresh", 60, "{}");
        write_record(tmp.path(), "stale", WEEK.as_secs() as i64 * 2, "{}");
        std::os::unix::fs::symlink(
            tmp.path().join("nowhere"),
            tmp.path().join("dangling.json"),
        )
        .unwrap();

        let report = cache.sweep().await.expect("sweep");
        assert_eq!(report.errors, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.scanned, 3);
        assert!(tmp.path().join("fresh.json").exists());
        assert!(!tmp.path().join("stale.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn expiry_never_removes_a_concurrent_store() {
        let tmp = tempdir().unwrap();
        let cache = Arc::new(ResponseCache::new("advisor", tmp.path(), WEEK));
        let stale_age = WEEK.as_secs() as i64 + 60;
        let fresh = r#"{"schools":["fresh"]}"#;

        for round in 0..300 {
            write_record(tmp.path(), "k", stale_age, r#"{"schools":["stale"]}"#);
            let reader = {
                let cache = cache.clone();
                tokio::spawn(async move {
                    if round % 2 == 0 {
                        cache.lookup("k").await.map(|_| ())
                    } else {
                        cache.sweep().await.map(|_| ())
                    }
                })
            };
            let writer = {
                let cache = cache.clone();
                tokio::spawn(async move { cache.store("k", fresh).await })
            };
            reader.await.unwrap().expect("expire");
            writer.await.unwrap().expect("store");

            let hit = cache.lookup("k").await.unwrap();
            assert_eq!(
                hit.map(|h| h.payload).as_deref(),
                Some(fresh),
                "fresh entry lost in round {round}"
            );
        }
    }

    #[tokio::test]
    async fn sweep_of_missing_directory_is_empty() {
        let tmp = tempdir().unwrap();
        let cache = ResponseCache::new("advisor", tmp.path().join("absent"), WEEK);
        assert_eq!(cache.sweep().await.unwrap(), SweepReport::default());
    }

    #[test]
    fn reaper_gate_opens_once() {
        let cache = ResponseCache::new("advisor", "unused", WEEK);
        assert!(cache.claim_reaper());
        assert!(!cache.claim_reaper());
        assert!(!cache.claim_reaper());
    }
}
