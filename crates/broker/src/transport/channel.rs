//! Tokio channel-based transport for single-process mode
//!
//! Uses broadcast channels for pub/sub semantics within a single process.
//! No serialization overhead - messages are passed directly.

use crate::error::TransportError;
use crate::transport::{Publisher, Routed, Subscriber};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::broadcast;

/// Channel-based publisher using broadcast
pub struct ChannelPublisher<M> {
    tx: broadcast::Sender<Routed<M>>,
    topic: String,
}

impl<M: Clone> ChannelPublisher<M> {
    /// Create a publisher/subscriber pair with given capacity
    pub fn pair(topic: &str, capacity: usize) -> (Self, ChannelSubscriber<M>) {
        let (tx, rx) = broadcast::channel(capacity);
        (
            Self {
                tx: tx.clone(),
                topic: topic.to_string(),
            },
            ChannelSubscriber { rx, _tx: tx },
        )
    }

    /// Get another subscriber for this publisher
    pub fn subscribe(&self) -> ChannelSubscriber<M> {
        ChannelSubscriber {
            rx: self.tx.subscribe(),
            _tx: self.tx.clone(),
        }
    }
}

#[async_trait]
impl<M> Publisher<M> for ChannelPublisher<M>
where
    M: Serialize + Clone + Send + Sync + 'static,
{
    fn default_topic(&self) -> &str {
        &self.topic
    }

    async fn publish_to(&self, topic: &str, msg: &M) -> Result<(), TransportError> {
        // No receivers is fine: publishing to nobody is a no-op
        let _ = self.tx.send(Routed {
            topic: topic.to_string(),
            message: msg.clone(),
        });
        Ok(())
    }
}

/// Channel-based subscriber using broadcast receiver
pub struct ChannelSubscriber<M> {
    rx: broadcast::Receiver<Routed<M>>,
    // Keep sender alive to prevent channel from closing
    _tx: broadcast::Sender<Routed<M>>,
}

#[async_trait]
impl<M> Subscriber<M> for ChannelSubscriber<M>
where
    M: DeserializeOwned + Clone + Send + 'static,
{
    async fn next(&mut self) -> Result<Routed<M>, TransportError> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Ok(msg),
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Skip lagged messages and continue
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TransportError::ChannelClosed);
                }
            }
        }
    }

    fn try_next(&mut self) -> Result<Option<Routed<M>>, TransportError> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(_)) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(TransportError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pubsub() {
        let (publisher, mut subscriber) = ChannelPublisher::<String>::pair("prices/update", 10);

        publisher.publish(&"hello".to_string()).await.unwrap();

        let msg = subscriber.next().await.unwrap();
        assert_eq!(msg.topic, "prices/update");
        assert_eq!(msg.message, "hello");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_and_explicit_topic() {
        let (publisher, mut sub1) = ChannelPublisher::<i32>::pair("a", 10);
        let mut sub2 = publisher.subscribe();

        publisher.publish_to("b", &42).await.unwrap();

        assert_eq!(sub1.next().await.unwrap().topic, "b");
        assert_eq!(sub2.next().await.unwrap().message, 42);
        assert!(sub1.try_next().unwrap().is_none());
    }
}
