//! Broker server - accept loop, router task and the in-process handle

use bytes::Bytes;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tickcast_ports::Clock;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::DEFAULT_MAX_FRAME;
use crate::error::{BrokerError, TransportError};
use crate::router::{Router, RouterCommand, RouterStats};
use crate::session::{self, SessionContext};
use crate::table::{ConnectionId, ConnectionInfo, ConnectionTable};
use crate::topic::Topic;

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Time allowed between accept and the CONNECT frame
    pub handshake_timeout: Duration,
    /// Time before an unacknowledged delivery is resent
    pub ack_timeout: Duration,
    /// Resends of one delivery before the connection is dropped
    pub max_retransmits: u32,
    /// Unacknowledged deliveries allowed per subscriber
    pub max_inflight: usize,
    /// Per-subscriber delivery queue; overflow disconnects that subscriber
    pub queue_capacity: usize,
    pub max_frame: usize,
    pub router_capacity: usize,
}

impl BrokerConfig {
    /// Loopback broker on the given port (0 picks a free one)
    pub fn local(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1883,
            handshake_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(5),
            max_retransmits: 3,
            max_inflight: 32,
            queue_capacity: 64,
            max_frame: DEFAULT_MAX_FRAME,
            router_capacity: 1024,
        }
    }
}

/// Point-in-time broker counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct BrokerStats {
    pub connections: usize,
    pub subscribers: usize,
    pub routed: u64,
    pub delivered: u64,
    pub evicted: u64,
}

/// A running broker
pub struct Broker {
    handle: BrokerHandle,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
    router_task: JoinHandle<()>,
}

impl Broker {
    /// Bind the listener and spawn the router and accept loop.
    ///
    /// Everything stops when `shutdown` is cancelled.
    pub async fn start(
        config: BrokerConfig,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Result<Self, BrokerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BrokerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let table = Arc::new(ConnectionTable::new(clock, config.queue_capacity));
        let stats = Arc::new(RouterStats::default());
        let (router_tx, router_rx) = mpsc::channel(config.router_capacity);

        let router = Router::new(table.clone(), stats.clone());
        let router_task = tokio::spawn(router.run(router_rx, shutdown.clone()));

        let ctx = Arc::new(SessionContext {
            table: table.clone(),
            router: router_tx.clone(),
            config: Arc::new(config),
            shutdown: shutdown.clone(),
        });
        let accept_task = tokio::spawn(accept_loop(listener, ctx, shutdown));

        info!("Broker listening on {}", local_addr);
        Ok(Self {
            handle: BrokerHandle {
                router: router_tx,
                table,
                stats,
            },
            local_addr,
            accept_task,
            router_task,
        })
    }

    pub fn handle(&self) -> BrokerHandle {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the accept loop and router to finish after shutdown
    pub async fn join(self) {
        let _ = self.accept_task.await;
        let _ = self.router_task.await;
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<SessionContext>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(session::run(stream, peer, ctx.clone()));
                }
                Err(e) => {
                    // e.g. EMFILE; back off instead of spinning
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }
    info!("Broker accept loop stopped");
}

/// Cloneable in-process access to a running broker
#[derive(Clone)]
pub struct BrokerHandle {
    router: mpsc::Sender<RouterCommand>,
    table: Arc<ConnectionTable>,
    stats: Arc<RouterStats>,
}

impl BrokerHandle {
    /// Publish through the router, returning how many subscriber queues
    /// the message entered. Zero subscribers is not an error.
    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<usize, TransportError> {
        let topic = Topic::new(topic)?;
        let (done, delivered) = oneshot::channel();
        self.router
            .send(RouterCommand::Publish {
                topic,
                payload,
                done: Some(done),
            })
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        delivered.await.map_err(|_| TransportError::ChannelClosed)
    }

    /// Forcibly drop a connection
    pub fn disconnect(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let info = self.table.disconnect(id);
        if info.is_none() {
            warn!("Disconnect requested for unknown connection {}", id);
        }
        info
    }

    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.table.info(id)
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.table.list()
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            connections: self.table.len(),
            subscribers: self.table.subscriber_count(),
            routed: self.stats.routed(),
            delivered: self.stats.delivered(),
            evicted: self.stats.evicted(),
        }
    }
}
