//! Tickcast Publisher
//!
//! Polls the price provider on a fixed interval, replaces the snapshot
//! cache on success and announces each new snapshot on the notification
//! topic. On failure the previous snapshot stays in the cache and the
//! publisher waits for its next regular tick.

pub mod config;
pub mod service;
pub mod state;

pub use config::{DEFAULT_INTERVAL, NotificationMode, NotificationModeError, PublisherConfig};
pub use service::PriceFeedPublisher;
pub use state::{CycleOutcome, PublisherState, PublisherStats};
