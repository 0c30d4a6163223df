use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }
}

/// Rolling file sink for `aidvisor::*` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSink {
    pub dir: String,
    pub prefix: String,
    pub rotation: Rotation,
}

impl FileSink {
    /// `AIDVISOR_LOG_ROLL=1` enables the sink; `AIDVISOR_LOG_DIR`,
    /// `AIDVISOR_LOG_PREFIX`, and `AIDVISOR_LOG_ROTATION` tune it.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if get("AIDVISOR_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        Some(Self {
            dir: get("AIDVISOR_LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            prefix: get("AIDVISOR_LOG_PREFIX").unwrap_or_else(|| "aidvisor".to_string()),
            rotation: get("AIDVISOR_LOG_ROTATION")
                .map(|r| Rotation::parse(&r))
                .unwrap_or(Rotation::Daily),
        })
    }
}

/// Install the process-wide subscriber. `RUST_LOG` drives the console filter
/// (default `info`). Calling this more than once is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    let Some(sink) = FileSink::from_env() else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&sink.dir).is_err() {
        eprintln!("aidvisor: failed to create log directory {}", sink.dir);
    }
    let writer = match sink.rotation {
        Rotation::Hourly => tracing_appender::rolling::hourly(&sink.dir, &sink.prefix),
        Rotation::Minutely => tracing_appender::rolling::minutely(&sink.dir, &sink.prefix),
        Rotation::Daily => tracing_appender::rolling::daily(&sink.dir, &sink.prefix),
    };
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = FILE_GUARD.set(guard);
    let targets = Targets::new().with_target("aidvisor", tracing::Level::DEBUG);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(nb)
        .with_filter(targets);
    if registry.with(file_layer).try_init().is_ok() {
        tracing::info!(
            target: "aidvisor::telemetry",
            dir = %sink.dir,
            rotation = ?sink.rotation,
            "rolling log file enabled"
        );
    }
}
