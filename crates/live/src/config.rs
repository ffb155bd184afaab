use std::time::Duration;

use crate::view::ViewMode;

/// Errors raised while reading [`WatchConfig`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Configuration of the `rollcall-watch` binary.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// REST base URL (default: `http://localhost:3500`).
    pub api_base_url: String,
    /// Socket.IO base URL (default: `api_base_url`).
    pub stream_url: String,
    pub view_mode: ViewMode,
    /// HTTP request timeout (default: 20s).
    pub request_timeout: Duration,
    /// Period of forced resyncs; `None` disables them.
    pub refresh_interval: Option<Duration>,
}

impl WatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `API_BASE_URL`          | `http://localhost:3500`  |
    /// | `STREAM_URL`            | `API_BASE_URL`           |
    /// | `VIEW_MODE`             | `latest`                 |
    /// | `REQUEST_TIMEOUT_SECS`  | `20`                     |
    /// | `REFRESH_INTERVAL_SECS` | unset (off)              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`WatchConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_base_url = var("API_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3500".into())
            .trim_end_matches('/')
            .to_string();

        // The stream client maps http(s) to ws(s) itself.
        let stream_url = var("STREAM_URL").unwrap_or_else(|| api_base_url.clone());

        let view_mode = match var("VIEW_MODE") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "VIEW_MODE",
                expected: "'latest' or 'previous'",
                value,
            })?,
            None => ViewMode::Latest,
        };

        let request_timeout = Duration::from_secs(
            parse_secs("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"))?.unwrap_or(20),
        );

        let refresh_interval = parse_secs("REFRESH_INTERVAL_SECS", var("REFRESH_INTERVAL_SECS"))?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            api_base_url,
            stream_url,
            view_mode,
            request_timeout,
            refresh_interval,
        })
    }
}

fn parse_secs(name: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|value| {
            value.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name,
                expected: "a whole number of seconds",
                value,
            })
        })
        .transpose()
}
