use std::time::Duration;

use tickcast_core::PRICES_TOPIC;

use crate::retry::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX};

/// Client-side subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Broker address, `host:port`
    pub broker_addr: String,
    pub client_id: String,
    /// Topic filters subscribed after every (re)connect
    pub filters: Vec<String>,
    /// Declared to the broker; the client pings at this period
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Pending callback events; further events are dropped while full
    pub dispatch_capacity: usize,
    /// Age beyond which a fetched snapshot is reported as `cached`
    pub stale_after: Duration,
    /// Bound on every side-channel request
    pub request_timeout: Duration,
}

impl SubscriberConfig {
    pub fn new(broker_addr: impl Into<String>) -> Self {
        Self {
            broker_addr: broker_addr.into(),
            ..Default::default()
        }
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            broker_addr: "127.0.0.1:1883".to_string(),
            client_id: format!("tickcast-client-{}", uuid::Uuid::new_v4().simple()),
            filters: vec![PRICES_TOPIC.to_string()],
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            dispatch_capacity: 16,
            stale_after: Duration::from_secs(1800),
            request_timeout: Duration::from_secs(10),
        }
    }
}
