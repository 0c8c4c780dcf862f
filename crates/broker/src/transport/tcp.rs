//! Publishers backed by a real broker

use async_trait::async_trait;
use serde::Serialize;

use crate::client::RemotePublisher;
use crate::error::TransportError;
use crate::server::BrokerHandle;
use crate::transport::{Publisher, encode_json};

/// Publishes JSON into the embedded broker without a socket
#[derive(Clone)]
pub struct BrokerPublisher {
    handle: BrokerHandle,
    topic: String,
}

impl BrokerPublisher {
    pub fn new(handle: BrokerHandle, topic: impl Into<String>) -> Self {
        Self {
            handle,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl<M> Publisher<M> for BrokerPublisher
where
    M: Serialize + Send + Sync,
{
    fn default_topic(&self) -> &str {
        &self.topic
    }

    async fn publish_to(&self, topic: &str, msg: &M) -> Result<(), TransportError> {
        self.handle.publish(topic, encode_json(msg)?).await?;
        Ok(())
    }
}

/// Publishes JSON into a broker in another process
pub struct RemoteTopicPublisher {
    client: RemotePublisher,
    topic: String,
}

impl RemoteTopicPublisher {
    pub fn new(client: RemotePublisher, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl<M> Publisher<M> for RemoteTopicPublisher
where
    M: Serialize + Send + Sync,
{
    fn default_topic(&self) -> &str {
        &self.topic
    }

    async fn publish_to(&self, topic: &str, msg: &M) -> Result<(), TransportError> {
        self.client.publish_bytes(topic, encode_json(msg)?).await
    }
}
