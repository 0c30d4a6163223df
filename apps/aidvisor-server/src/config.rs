use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "configs/aidvisor.toml";
const WEEK_SECS: u64 = 7 * 24 * 60 * 60;

pub const DEFAULT_ALLOWED_ORIGINS: &[&str] =
    &["https://my-aidvisor.webflow.io", "https://www.auroramentor.ai"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid bind address {0}")]
    InvalidBind(String),
}

/// Effective server settings: defaults, then the TOML file, then the
/// environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/response_cache`.
    pub response_cache_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/college_details_cache`.
    pub details_cache_dir: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub cache_sweep_secs: u64,
    pub ticket_retention_secs: u64,
    pub advisor_timeout_secs: u64,
    pub details_timeout_secs: u64,
    pub max_inflight_jobs: usize,
    pub max_body_bytes: usize,
    pub allowed_origins: Vec<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    /// Defaults to `<data_dir>/openai.json`.
    pub secrets_path: Option<PathBuf>,
    pub http_connect_timeout_secs: u64,
    pub http_keepalive_secs: u64,
    pub http_pool_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8443,
            data_dir: PathBuf::from("data"),
            response_cache_dir: None,
            details_cache_dir: None,
            cache_ttl_secs: WEEK_SECS,
            cache_sweep_secs: WEEK_SECS,
            ticket_retention_secs: 600,
            advisor_timeout_secs: 600,
            details_timeout_secs: 180,
            max_inflight_jobs: 256,
            max_body_bytes: 1 << 20,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            openai_base_url: "https://api.openai.com".into(),
            openai_model: "gpt-5".into(),
            secrets_path: None,
            http_connect_timeout_secs: 10,
            http_keepalive_secs: 60,
            http_pool_idle_secs: 90,
        }
    }
}

impl ServerConfig {
    /// Load from `AIDVISOR_CONFIG` (or `configs/aidvisor.toml` when present)
    /// and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    fn load_with(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let explicit = get("AIDVISOR_CONFIG").filter(|p| !p.trim().is_empty());
        let mut cfg = match explicit {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        cfg.apply_env(get)?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded server config");
        Ok(cfg)
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(bind) = get("AIDVISOR_BIND") {
            self.bind = bind.trim().to_string();
        }
        // AIDVISOR_PORT wins over the platform-provided PORT.
        for key in ["PORT", "AIDVISOR_PORT"] {
            if let Some(port) = parse_env(&get, key)? {
                self.port = port;
            }
        }
        if let Some(dir) = get("AIDVISOR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_env(&get, "AIDVISOR_CACHE_TTL_SECS")? {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = parse_env(&get, "AIDVISOR_CACHE_SWEEP_SECS")? {
            self.cache_sweep_secs = v;
        }
        if let Some(v) = parse_env(&get, "AIDVISOR_TICKET_RETENTION_SECS")? {
            self.ticket_retention_secs = v;
        }
        if let Some(v) = parse_env(&get, "AIDVISOR_MAX_INFLIGHT")? {
            self.max_inflight_jobs = v;
        }
        if let Some(raw) = get("AIDVISOR_ALLOWED_ORIGINS") {
            self.allowed_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = get("AIDVISOR_OPENAI_BASE_URL") {
            self.openai_base_url = url;
        }
        if let Some(model) = get("AIDVISOR_OPENAI_MODEL") {
            self.openai_model = model;
        }
        if let Some(path) = get("OPENAI_SECRETS_PATH").filter(|p| !p.trim().is_empty()) {
            self.secrets_path = Some(PathBuf::from(path));
        }
        if let Some(v) = parse_env(&get, "AIDVISOR_HTTP_CONNECT_TIMEOUT_SECS")? {
            self.http_connect_timeout_secs = v;
        }
        if let Some(v) = parse_env(&get, "AIDVISOR_HTTP_TCP_KEEPALIVE_SECS")? {
            self.http_keepalive_secs = v;
        }
        if let Some(v) = parse_env(&get, "AIDVISOR_HTTP_POOL_IDLE_SECS")? {
            self.http_pool_idle_secs = v;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidBind(format!("{}:{}", self.bind, self.port)))
    }

    pub fn response_cache_dir(&self) -> PathBuf {
        self.response_cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("response_cache"))
    }

    pub fn details_cache_dir(&self) -> PathBuf {
        self.details_cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("college_details_cache"))
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.secrets_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("openai.json"))
    }

    pub fn advisor_latency_path(&self) -> PathBuf {
        self.data_dir.join("chat_latency_stats.json")
    }

    pub fn details_latency_path(&self) -> PathBuf {
        self.data_dir.join("details_latency_stats.json")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep_period(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs)
    }

    pub fn ticket_retention(&self) -> Duration {
        Duration::from_secs(self.ticket_retention_secs)
    }

    pub fn advisor_timeout(&self) -> Duration {
        Duration::from_secs(self.advisor_timeout_secs)
    }

    pub fn details_timeout(&self) -> Duration {
        Duration::from_secs(self.details_timeout_secs)
    }
}

fn parse_env<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value: raw }),
    }
}
