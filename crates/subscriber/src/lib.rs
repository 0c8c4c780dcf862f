//! Tickcast Subscriber
//!
//! Client-embedded side of the price feed:
//! - keeps one subscriber session to the broker alive, reconnecting with
//!   exponential backoff (2s doubling to 32s, reset on success)
//! - turns notifications into [`UpdateEvent`]s handed to a host callback on
//!   a dedicated dispatch thread, never on the I/O path
//! - answers `fetch_now` over a side channel, independent of the broker,
//!   keeping the last good snapshot for degraded responses
//!
//! A reconnect may skip notifications. The client posts
//! [`UpdateEvent::Resync`] after every reconnect so the host can call
//! `fetch_now` and converge.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod retry;
pub mod source;

pub use client::PriceClient;
pub use config::SubscriberConfig;
pub use connection::ConnectionState;
pub use dispatch::{CallbackSlot, DISPATCH_THREAD_NAME, UpdateCallback, UpdateEvent};
pub use error::ClientError;
pub use retry::RetryState;
pub use source::{CacheSource, HttpDataClient};
