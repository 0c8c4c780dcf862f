//! Router - single task that orders and fans out every publish
//!
//! All publishes, from TCP publishers and in-process handles alike, pass
//! through one mpsc queue into this task. It stamps each with the next
//! sequence number and pushes it into the delivery queue of every matching
//! subscriber, so each subscriber sees messages in router receive order.

use bytes::Bytes;
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::table::{ConnectionTable, Delivery};
use crate::topic::Topic;

pub(crate) enum RouterCommand {
    Publish {
        topic: Topic,
        payload: Bytes,
        /// Receives the number of subscriber queues the message entered
        done: Option<oneshot::Sender<usize>>,
    },
}

/// Routing counters
#[derive(Debug, Default)]
pub struct RouterStats {
    routed: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
}

impl RouterStats {
    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Connections dropped because their delivery queue was full
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

pub(crate) struct Router {
    table: Arc<ConnectionTable>,
    stats: Arc<RouterStats>,
    next_id: u64,
}

impl Router {
    pub(crate) fn new(table: Arc<ConnectionTable>, stats: Arc<RouterStats>) -> Self {
        Self {
            table,
            stats,
            next_id: 0,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<RouterCommand>,
        shutdown: CancellationToken,
    ) {
        info!("Router started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(RouterCommand::Publish { topic, payload, done }) => {
                        let delivered = self.route(topic, payload);
                        if let Some(done) = done {
                            let _ = done.send(delivered);
                        }
                    }
                    None => break,
                },
            }
        }
        info!("Router stopped after {} publishes", self.stats.routed());
    }

    fn route(&mut self, topic: Topic, payload: Bytes) -> usize {
        self.next_id += 1;
        let message_id = self.next_id;
        self.stats.routed.fetch_add(1, Ordering::Relaxed);

        let targets = self.table.matching_queues(&topic);
        if targets.is_empty() {
            trace!("No subscribers for {}", topic);
            return 0;
        }

        let mut delivered = 0;
        for (id, queue) in targets {
            let delivery = Delivery {
                message_id,
                topic: topic.clone(),
                payload: payload.clone(),
            };
            match queue.try_send(delivery) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Delivery queue full for {}, disconnecting slow consumer", id);
                    self.stats.evicted.fetch_add(1, Ordering::Relaxed);
                    self.table.disconnect(id);
                }
                // Session already exiting
                Err(TrySendError::Closed(_)) => {}
            }
        }

        self.stats
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        debug!("Routed #{} on {} to {} subscribers", message_id, topic, delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Role;
    use crate::topic::TopicFilter;
    use tickcast_clock::SystemClock;

    fn setup(capacity: usize) -> (Router, Arc<ConnectionTable>, Arc<RouterStats>) {
        let table = Arc::new(ConnectionTable::new(Arc::new(SystemClock::new()), capacity));
        let stats = Arc::new(RouterStats::default());
        (Router::new(table.clone(), stats.clone()), table, stats)
    }

    fn topic() -> Topic {
        Topic::new("prices/update").unwrap()
    }

    #[test]
    fn test_zero_subscribers_is_noop() {
        let (mut router, _, stats) = setup(4);
        assert_eq!(router.route(topic(), Bytes::from_static(b"x")), 0);
        assert_eq!(stats.routed(), 1);
        assert_eq!(stats.delivered(), 0);
    }

    #[test]
    fn test_fan_out_in_order() {
        let (mut router, table, _) = setup(16);
        let root = CancellationToken::new();
        let mut subs: Vec<_> = (0..3)
            .map(|i| {
                let adm = table.accept_connection(Role::Subscriber, &format!("s{}", i), &root);
                table.subscribe(adm.id, TopicFilter::new("prices/#").unwrap());
                adm
            })
            .collect();

        for n in 0..5u8 {
            assert_eq!(router.route(topic(), Bytes::from(vec![n])), 3);
        }

        for sub in &mut subs {
            let ids: Vec<u64> = (0..5).map(|_| sub.deliveries.try_recv().unwrap().message_id).collect();
            assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_full_queue_evicts_only_that_subscriber() {
        let (mut router, table, stats) = setup(2);
        let root = CancellationToken::new();
        let slow = table.accept_connection(Role::Subscriber, "slow", &root);
        let mut fast = table.accept_connection(Role::Subscriber, "fast", &root);
        table.subscribe(slow.id, TopicFilter::new("prices/update").unwrap());
        table.subscribe(fast.id, TopicFilter::new("prices/update").unwrap());

        for _ in 0..3 {
            router.route(topic(), Bytes::from_static(b"x"));
            // fast consumer keeps draining
            fast.deliveries.try_recv().unwrap();
        }

        assert!(slow.kill.is_cancelled());
        assert!(table.info(slow.id).is_none());
        assert!(table.info(fast.id).is_some());
        assert_eq!(stats.evicted(), 1);
    }
}
