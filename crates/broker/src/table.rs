//! Connection table
//!
//! Sharded map (`DashMap`) of live sessions. Accepting one connection and
//! tearing down another only contend on a single shard, so a slow
//! disconnect never holds up new accepts. Entries are created only by
//! [`ConnectionTable::accept_connection`] and removed only by
//! [`ConnectionTable::disconnect`].

use bytes::Bytes;
use dashmap::DashMap;
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;
use tickcast_core::Timestamp;
use tickcast_ports::Clock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::codec::Role;
use crate::topic::{Topic, TopicFilter};

pub type ConnectionId = Uuid;

/// Seconds the resend mark of a publisher with no live connection is kept
pub const MARK_RETENTION_SECS: i64 = 600;

/// A routed message waiting in one subscriber's delivery queue
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-wide sequence number, in router receive order
    pub message_id: u64,
    pub topic: Topic,
    pub payload: Bytes,
}

/// One publisher or subscriber session
#[derive(Debug)]
pub struct BrokerConnection {
    pub id: ConnectionId,
    pub role: Role,
    pub client_id: String,
    pub filters: Vec<TopicFilter>,
    pub last_activity: Timestamp,
    queue: mpsc::Sender<Delivery>,
    kill: CancellationToken,
}

/// Read-only view of a connection for stats and tests
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub role: Role,
    pub client_id: String,
    pub filters: Vec<String>,
    pub last_activity: Timestamp,
}

/// What a session gets back when it is admitted
pub struct Admission {
    pub id: ConnectionId,
    pub deliveries: mpsc::Receiver<Delivery>,
    /// Cancelled when the broker evicts the connection or shuts down
    pub kill: CancellationToken,
}

/// Last message id routed for one publisher client id
#[derive(Debug, Clone, Copy)]
struct PublisherMark {
    message_id: u64,
    seen_at: Timestamp,
}

pub struct ConnectionTable {
    connections: DashMap<ConnectionId, BrokerConnection>,
    /// Per publisher client id, so a resend over a fresh connection is
    /// still recognised
    publisher_marks: DashMap<String, PublisherMark>,
    clock: Arc<dyn Clock>,
    queue_capacity: usize,
}

impl ConnectionTable {
    pub fn new(clock: Arc<dyn Clock>, queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            publisher_marks: DashMap::new(),
            clock,
            queue_capacity,
        }
    }

    pub fn accept_connection(
        &self,
        role: Role,
        client_id: &str,
        parent: &CancellationToken,
    ) -> Admission {
        let id = Uuid::new_v4();
        let (queue, deliveries) = mpsc::channel(self.queue_capacity);
        let kill = parent.child_token();
        if role == Role::Publisher {
            self.prune_marks(client_id);
        }

        self.connections.insert(
            id,
            BrokerConnection {
                id,
                role,
                client_id: client_id.to_string(),
                filters: Vec::new(),
                last_activity: self.clock.now(),
                queue,
                kill: kill.clone(),
            },
        );
        debug!("Connection {} admitted as {:?} ({})", id, role, client_id);

        Admission {
            id,
            deliveries,
            kill,
        }
    }

    /// Add a filter to a connection; returns false if the connection is gone
    pub fn subscribe(&self, id: ConnectionId, filter: TopicFilter) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut conn) => {
                if !conn.filters.contains(&filter) {
                    conn.filters.push(filter);
                }
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, id: ConnectionId, filter: &TopicFilter) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut conn) => {
                conn.filters.retain(|f| f != filter);
                true
            }
            None => false,
        }
    }

    pub fn touch(&self, id: ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            conn.last_activity = self.clock.now();
        }
    }

    /// Remove a connection and signal its session to stop. Idempotent.
    pub fn disconnect(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let (_, conn) = self.connections.remove(&id)?;
        conn.kill.cancel();
        debug!("Connection {} removed", id);
        Some(info_of(&conn))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&id).map(|c| info_of(&c))
    }

    pub fn list(&self) -> Vec<ConnectionInfo> {
        self.connections.iter().map(|c| info_of(&c)).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.role == Role::Subscriber)
            .count()
    }

    /// Delivery queues of every subscriber with a filter matching `topic`.
    /// Collected up front so no shard lock is held while sending.
    pub(crate) fn matching_queues(&self, topic: &Topic) -> Vec<(ConnectionId, mpsc::Sender<Delivery>)> {
        self.connections
            .iter()
            .filter(|c| c.role == Role::Subscriber && c.filters.iter().any(|f| f.matches(topic)))
            .map(|c| (c.id, c.queue.clone()))
            .collect()
    }

    /// Record `message_id` from a publisher client. Returns false when it
    /// is a resend of an id already routed.
    ///
    /// Only resends (`dup`) are filtered. A first transmission at or below
    /// the mark comes from a restarted publisher reusing its client id, so
    /// it is routed and restarts the mark.
    pub(crate) fn mark_published(&self, client_id: &str, message_id: u64, dup: bool) -> bool {
        let now = self.clock.now();
        let mut mark = self
            .publisher_marks
            .entry(client_id.to_string())
            .or_insert(PublisherMark {
                message_id: 0,
                seen_at: now,
            });
        mark.seen_at = now;
        if dup && message_id <= mark.message_id {
            return false;
        }
        if message_id <= mark.message_id {
            debug!("Publisher {} restarted its ids at {}", client_id, message_id);
        }
        mark.message_id = message_id;
        true
    }

    pub fn publisher_mark_count(&self) -> usize {
        self.publisher_marks.len()
    }

    /// Drop marks of publishers that are gone and have been quiet for
    /// longer than [`MARK_RETENTION_SECS`]. `admitting` is always kept.
    fn prune_marks(&self, admitting: &str) {
        let live: HashSet<String> = self
            .connections
            .iter()
            .filter(|c| c.role == Role::Publisher)
            .map(|c| c.client_id.clone())
            .collect();
        let cutoff = self.clock.now() - chrono::Duration::seconds(MARK_RETENTION_SECS);
        self.publisher_marks.retain(|client_id, mark| {
            client_id == admitting || live.contains(client_id) || mark.seen_at > cutoff
        });
    }
}

fn info_of(conn: &BrokerConnection) -> ConnectionInfo {
    ConnectionInfo {
        id: conn.id,
        role: conn.role,
        client_id: conn.client_id.clone(),
        filters: conn.filters.iter().map(|f| f.as_str().to_string()).collect(),
        last_activity: conn.last_activity,
    }
}
