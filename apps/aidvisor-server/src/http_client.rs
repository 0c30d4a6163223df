use std::time::Duration;

use crate::config::ServerConfig;

fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

fn user_agent() -> String {
    format!("aidvisor-server/{}", env!("CARGO_PKG_VERSION"))
}

/// Base client builder with shared defaults. Request deadlines are applied
/// per call, since each job lane has its own.
pub fn builder(config: &ServerConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(secs(config.http_connect_timeout_secs))
        .tcp_keepalive(secs(config.http_keepalive_secs))
        .pool_idle_timeout(secs(config.http_pool_idle_secs))
}

pub fn client(config: &ServerConfig) -> Result<reqwest::Client, reqwest::Error> {
    builder(config).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_durations_are_clamped() {
        assert_eq!(secs(0), Duration::from_secs(1));
        assert_eq!(secs(45), Duration::from_secs(45));
    }

    #[test]
    fn client_builds_from_defaults() {
        assert!(client(&ServerConfig::default()).is_ok());
    }
}
