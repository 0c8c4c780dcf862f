//! Transport abstraction layer
//!
//! The publisher service publishes through the [`Publisher`] trait, so the
//! same code can run against the embedded broker, a remote broker over
//! TCP, or a plain tokio channel in tests.

pub mod channel;
pub mod tcp;

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

/// Publisher - sends messages to topics
#[async_trait]
pub trait Publisher<M>: Send + Sync
where
    M: Serialize + Send + Sync,
{
    /// Topic used by [`Publisher::publish`]
    fn default_topic(&self) -> &str;

    /// Publish a message to a specific topic
    async fn publish_to(&self, topic: &str, msg: &M) -> Result<(), TransportError>;

    /// Publish a message to the default topic
    async fn publish(&self, msg: &M) -> Result<(), TransportError> {
        let topic = self.default_topic().to_string();
        self.publish_to(&topic, msg).await
    }
}

/// Subscriber - receives messages from a topic pattern
#[async_trait]
pub trait Subscriber<M>: Send
where
    M: DeserializeOwned + Send,
{
    /// Wait for the next message
    async fn next(&mut self) -> Result<Routed<M>, TransportError>;

    /// Try to receive without blocking (returns None if no message available)
    fn try_next(&mut self) -> Result<Option<Routed<M>>, TransportError>;
}

/// A message together with the topic it was published on
#[derive(Debug, Clone, PartialEq)]
pub struct Routed<M> {
    pub topic: String,
    pub message: M,
}

pub(crate) fn encode_json<M: Serialize>(msg: &M) -> Result<bytes::Bytes, TransportError> {
    serde_json::to_vec(msg)
        .map(bytes::Bytes::from)
        .map_err(|e| TransportError::Serialization(e.to_string()))
}
