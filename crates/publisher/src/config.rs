//! Publisher configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use tickcast_core::{PRICES_TOPIC, Symbol};

/// Default fetch interval (15 minutes)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(900);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown notification mode '{0}' (expected 'marker' or 'payload')")]
pub struct NotificationModeError(pub String);

/// What goes on the notification topic after a successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationMode {
    /// Change marker only; subscribers fetch the data themselves
    #[default]
    Marker,
    /// Marker plus the full snapshot
    Payload,
}

impl FromStr for NotificationMode {
    type Err = NotificationModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "marker" => Ok(NotificationMode::Marker),
            "payload" => Ok(NotificationMode::Payload),
            other => Err(NotificationModeError(other.to_string())),
        }
    }
}

impl fmt::Display for NotificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationMode::Marker => write!(f, "marker"),
            NotificationMode::Payload => write!(f, "payload"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Fixed fetch interval; failures wait for the next regular tick
    pub interval: Duration,
    /// Tracked symbol set, must be non-empty
    pub symbols: Vec<Symbol>,
    pub mode: NotificationMode,
    /// Notification topic
    pub topic: String,
    /// Also publish each quote on `prices/symbol/{SYM}`
    pub publish_per_symbol: bool,
}

impl PublisherConfig {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self {
            symbols,
            ..Default::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_mode(mut self, mode: NotificationMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            symbols: Vec::new(),
            mode: NotificationMode::Marker,
            topic: PRICES_TOPIC.to_string(),
            publish_per_symbol: false,
        }
    }
}
