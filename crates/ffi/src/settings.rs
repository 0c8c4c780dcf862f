//! Client settings, read from `.env.client` and the process environment

use log::LevelFilter;
use std::time::Duration;

pub const ENV_FILE: &str = ".env.client";
pub const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:1883";
pub const DEFAULT_DATA_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub broker_addr: String,
    pub data_url: String,
    pub log_level: LevelFilter,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            broker_addr: DEFAULT_BROKER_ADDR.to_string(),
            data_url: DEFAULT_DATA_URL.to_string(),
            log_level: LevelFilter::Info,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientSettings {
    pub fn from_env() -> Self {
        // A missing file is normal on devices; the environment still applies
        let _ = dotenvy::from_filename(ENV_FILE);
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            broker_addr: non_empty("TICKCAST_BROKER_ADDR").unwrap_or(defaults.broker_addr),
            data_url: non_empty("TICKCAST_DATA_URL").unwrap_or(defaults.data_url),
            log_level: non_empty("LOG_LEVEL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_level),
            request_timeout: non_empty("TICKCAST_REQUEST_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}
