//! Relay configuration, read from the environment.

use crate::error::{RelayError, Result};
use bus_client::DEFAULT_QUEUE;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Port the WebSocket endpoint listens on (`PORT`).
    pub port: u16,
    /// Bus connection URL (`REDIS_URL`).
    pub redis_url: String,
    /// List key consumed from the bus (`REDIS_QUEUE`).
    pub queue: String,
    /// Debug tracing on (`DEBUG` set and non-empty).
    pub debug: bool,
    /// Prometheus exporter port (`METRICS_PORT`), disabled when unset.
    pub metrics_port: Option<u16>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            debug: false,
            metrics_port: None,
        }
    }
}

impl RelayConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(v) => parse_port("PORT", &v)?,
            None => defaults.port,
        };
        let metrics_port = get("METRICS_PORT")
            .map(|v| parse_port("METRICS_PORT", &v))
            .transpose()?;

        Ok(Self {
            port,
            redis_url: get("REDIS_URL").unwrap_or(defaults.redis_url),
            queue: get("REDIS_QUEUE").unwrap_or(defaults.queue),
            debug: get("DEBUG").is_some(),
            metrics_port,
        })
    }

    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| RelayError::Config(format!("{} must be a port number, got '{}'", key, value)))
}
