use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use aidvisor_core::{GenerationError, GenerationTask, Generator};
use async_trait::async_trait;

use crate::config::ServerConfig;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub(crate) mod env {
    use super::*;

    pub(crate) struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        saved: HashMap<String, Option<String>>,
    }

    pub(crate) fn guard() -> EnvGuard {
        EnvGuard {
            _lock: ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
            saved: HashMap::new(),
        }
    }

    impl EnvGuard {
        fn remember(&mut self, key: &str) {
            self.saved
                .entry(key.to_string())
                .or_insert_with(|| std::env::var(key).ok());
        }

        pub(crate) fn set(&mut self, key: &str, value: impl AsRef<str>) {
            self.remember(key);
            std::env::set_var(key, value.as_ref());
        }

        pub(crate) fn set_opt(&mut self, key: &str, value: Option<&str>) {
            self.remember(key);
            match value {
                Some(val) => std::env::set_var(key, val),
                None => std::env::remove_var(key),
            }
        }

        pub(crate) fn remove(&mut self, key: &str) {
            self.set_opt(key, None);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain() {
                match value {
                    Some(val) => std::env::set_var(&key, val),
                    None => std::env::remove_var(&key),
                }
            }
        }
    }
}

/// Generator double: a fixed reply (or error) after an optional delay,
/// counting calls and remembering the last prompt.
pub(crate) struct ScriptedGenerator {
    reply: Result<String, fn() -> GenerationError>,
    delay: Duration,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(Ok(reply.into()), Duration::ZERO))
    }

    pub(crate) fn slow(reply: impl Into<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(Ok(reply.into()), delay))
    }

    pub(crate) fn failing(err: fn() -> GenerationError) -> Arc<Self> {
        Arc::new(Self::new(Err(err), Duration::ZERO))
    }

    fn new(reply: Result<String, fn() -> GenerationError>, delay: Duration) -> Self {
        Self {
            reply,
            delay,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        task: &GenerationTask,
        _timeout: Duration,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(task.user.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(make) => Err(make()),
        }
    }
}

/// Defaults with every on-disk path rooted in `dir`.
pub(crate) fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        data_dir: dir.to_path_buf(),
        secrets_path: Some(dir.join("secrets.json")),
        ..ServerConfig::default()
    }
}
