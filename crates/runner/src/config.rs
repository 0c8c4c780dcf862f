//! Server configuration from `.env.server` and the process environment

use std::time::Duration;
use thiserror::Error;

use tickcast_broker::BrokerConfig;
use tickcast_core::Symbol;
use tickcast_gateway::{ApiKey, DEFAULT_BASE_URL, ProviderConfig};
use tickcast_publisher::{DEFAULT_INTERVAL, NotificationMode, PublisherConfig};

pub const ENV_FILE: &str = ".env.server";
pub const DEFAULT_SYMBOLS: &str = "BTC,ETH,SOL,XRP,ADA,DOGE,DOT,LTC,LINK,AVAX";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Embedded broker; ignored when `external_broker` is set
    pub broker: BrokerConfig,
    pub external_broker: Option<String>,
    pub http_host: String,
    pub http_port: u16,
    pub provider: ProviderConfig,
    pub publisher: PublisherConfig,
    /// Snapshot age beyond which `/api/crypto-prices` reports `cached`
    pub stale_after: Duration,
    /// Raw `LOG_LEVEL`; resolved by [`crate::logging::init`]
    pub log_level: String,
}

impl ServerConfig {
    /// Load `.env.server` if present, then read the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::from_filename(ENV_FILE);
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("CMC_API_KEY").ok_or(ConfigError::Missing("CMC_API_KEY"))?;
        let provider = ProviderConfig::new(ApiKey::new(api_key))
            .with_base_url(get("CMC_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()))
            .with_timeout(secs(&get, "PROVIDER_TIMEOUT_SECONDS")?.unwrap_or(Duration::from_secs(10)));

        let interval = secs(&get, "UPDATE_INTERVAL_SECONDS")?.unwrap_or(DEFAULT_INTERVAL);
        let raw_symbols = get("TRACKED_SYMBOLS").unwrap_or_else(|| DEFAULT_SYMBOLS.to_string());
        let symbols = Symbol::parse_list(&raw_symbols)
            .map_err(|e| ConfigError::invalid("TRACKED_SYMBOLS", &raw_symbols, e))?;
        if symbols.is_empty() {
            return Err(ConfigError::invalid("TRACKED_SYMBOLS", &raw_symbols, "no symbols"));
        }
        let mode = match get("NOTIFICATION_MODE") {
            Some(raw) => raw
                .parse::<NotificationMode>()
                .map_err(|e| ConfigError::invalid("NOTIFICATION_MODE", &raw, e))?,
            None => NotificationMode::Marker,
        };
        let mut publisher = PublisherConfig::new(symbols)
            .with_interval(interval)
            .with_mode(mode);
        publisher.publish_per_symbol = flag(&get, "PUBLISH_PER_SYMBOL")?.unwrap_or(true);

        let broker = BrokerConfig {
            host: get("BROKER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: port(&get, "BROKER_PORT")?.unwrap_or(1883),
            ..Default::default()
        };

        Ok(Self {
            broker,
            external_broker: get("EXTERNAL_BROKER_ADDR"),
            http_host: get("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: port(&get, "HTTP_PORT")?.unwrap_or(8080),
            provider,
            publisher,
            stale_after: secs(&get, "STALE_AFTER_SECONDS")?.unwrap_or(interval * 2),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
        })
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

fn secs(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(key, &raw, "must be greater than zero")),
        Ok(n) => Ok(Some(Duration::from_secs(n))),
        Err(e) => Err(ConfigError::invalid(key, &raw, e)),
    }
}

fn port(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<u16>, ConfigError> {
    get(key)
        .map(|raw| raw.parse::<u16>().map_err(|e| ConfigError::invalid(key, &raw, e)))
        .transpose()
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::invalid(key, &raw, "expected true or false")),
    }
}
