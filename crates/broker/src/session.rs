//! Per-connection task on the broker side
//!
//! Handshake, then one loop multiplexing inbound frames, the delivery queue,
//! the keep-alive deadline and retransmission of unacknowledged publishes.
//! Every error ends only this session.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until, timeout};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::{ConnAckCode, FrameCodec, PROTOCOL_VERSION, Packet, Role};
use crate::error::ProtocolError;
use crate::router::RouterCommand;
use crate::server::BrokerConfig;
use crate::table::{ConnectionId, ConnectionTable, Delivery};
use crate::topic::{Topic, TopicFilter};

type Conn = Framed<TcpStream, FrameCodec>;

pub(crate) struct SessionContext {
    pub table: Arc<ConnectionTable>,
    pub router: mpsc::Sender<RouterCommand>,
    pub config: Arc<BrokerConfig>,
    pub shutdown: CancellationToken,
}

/// Why a session ended without a protocol error
#[derive(Debug)]
enum Closed {
    PeerDisconnect,
    PeerHangup,
    Evicted,
}

#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("keep-alive window of {0:?} elapsed")]
    KeepAliveExpired(Duration),

    #[error("message {0} unacknowledged after retransmits")]
    AckTimeout(u64),

    #[error("router stopped")]
    RouterGone,
}

struct Inflight {
    topic: Topic,
    payload: Bytes,
    sent_at: Instant,
    retransmits: u32,
}

pub(crate) async fn run(stream: TcpStream, peer: SocketAddr, ctx: Arc<SessionContext>) {
    let mut conn = Framed::new(stream, FrameCodec::new(ctx.config.max_frame));

    let (role, keep_alive_secs, client_id) = match handshake(&mut conn, &ctx.config).await {
        Ok(hello) => hello,
        Err(ProtocolError::UnsupportedVersion(v)) => {
            warn!("{} sent unsupported protocol version {}", peer, v);
            let _ = conn
                .send(Packet::ConnAck {
                    code: ConnAckCode::UnsupportedVersion,
                    connection_id: None,
                })
                .await;
            return;
        }
        Err(e) => {
            warn!("Handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let admission = ctx
        .table
        .accept_connection(role, &client_id, &ctx.shutdown);
    let id = admission.id;
    info!("{} connected from {} as {:?} ({})", client_id, peer, role, id);

    let ack = Packet::ConnAck {
        code: ConnAckCode::Accepted,
        connection_id: Some(id.to_string()),
    };
    if let Err(e) = conn.send(ack).await {
        warn!("Failed to send CONNACK to {}: {}", id, e);
        ctx.table.disconnect(id);
        return;
    }

    let keep_alive = (keep_alive_secs > 0).then(|| {
        Duration::from_millis(u64::from(keep_alive_secs) * 1000 * 3 / 2)
    });
    let mut session = Session {
        id,
        role,
        client_id,
        conn,
        ctx: ctx.clone(),
        inflight: BTreeMap::new(),
        keep_alive,
    };

    match session.drive(admission.deliveries, admission.kill).await {
        Ok(reason) => info!("Connection {} closed: {:?}", id, reason),
        Err(e) => warn!("Connection {} dropped: {}", id, e),
    }
    ctx.table.disconnect(id);
}

async fn handshake(
    conn: &mut Conn,
    config: &BrokerConfig,
) -> Result<(Role, u16, String), ProtocolError> {
    let first = timeout(config.handshake_timeout, conn.next())
        .await
        .map_err(|_| ProtocolError::HandshakeTimeout)?;

    match first {
        Some(Ok(Packet::Connect {
            protocol_version,
            role,
            keep_alive_secs,
            client_id,
        })) => {
            if protocol_version != PROTOCOL_VERSION {
                return Err(ProtocolError::UnsupportedVersion(protocol_version));
            }
            Ok((role, keep_alive_secs, client_id))
        }
        Some(Ok(other)) => Err(ProtocolError::UnexpectedPacket(other.kind())),
        Some(Err(e)) => Err(e),
        None => Err(ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into())),
    }
}

struct Session {
    id: ConnectionId,
    role: Role,
    client_id: String,
    conn: Conn,
    ctx: Arc<SessionContext>,
    inflight: BTreeMap<u64, Inflight>,
    keep_alive: Option<Duration>,
}

impl Session {
    async fn drive(
        &mut self,
        mut deliveries: mpsc::Receiver<Delivery>,
        kill: CancellationToken,
    ) -> Result<Closed, SessionError> {
        let config = self.ctx.config.clone();
        let far_future = Duration::from_secs(86_400 * 365);
        let mut deadline = Instant::now() + self.keep_alive.unwrap_or(far_future);
        let mut retransmit = interval((config.ack_timeout / 2).max(Duration::from_millis(10)));
        retransmit.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let can_send = self.role == Role::Subscriber && self.inflight.len() < config.max_inflight;

            tokio::select! {
                _ = kill.cancelled() => return Ok(Closed::Evicted),

                _ = sleep_until(deadline), if self.keep_alive.is_some() => {
                    return Err(SessionError::KeepAliveExpired(self.keep_alive.unwrap_or(far_future)));
                }

                frame = self.conn.next() => match frame {
                    None => return Ok(Closed::PeerHangup),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(packet)) => {
                        deadline = Instant::now() + self.keep_alive.unwrap_or(far_future);
                        self.ctx.table.touch(self.id);
                        if let Some(closed) = self.handle(packet).await? {
                            return Ok(closed);
                        }
                    }
                },

                Some(delivery) = deliveries.recv(), if can_send => {
                    self.deliver(delivery).await?;
                }

                _ = retransmit.tick(), if !self.inflight.is_empty() => {
                    self.retransmit_expired().await?;
                }
            }
        }
    }

    async fn handle(&mut self, packet: Packet) -> Result<Option<Closed>, SessionError> {
        match (packet, self.role) {
            (
                Packet::Publish {
                    message_id,
                    topic,
                    payload,
                    dup,
                },
                Role::Publisher,
            ) => {
                let topic = Topic::new(&topic)?;
                if self.ctx.table.mark_published(&self.client_id, message_id, dup) {
                    self.route(topic, payload).await?;
                } else {
                    debug!("Dropping resent message {} (dup={}) from {}", message_id, dup, self.client_id);
                }
                self.send(Packet::PubAck { message_id }).await?;
            }
            (Packet::Publish { .. }, Role::Subscriber) => {
                return Err(ProtocolError::RoleViolation("subscriber sent PUBLISH").into());
            }
            (Packet::Subscribe { packet_id, filters }, Role::Subscriber) => {
                for raw in &filters {
                    let filter = TopicFilter::new(raw)?;
                    debug!("{} subscribed to {}", self.id, filter);
                    self.ctx.table.subscribe(self.id, filter);
                }
                self.send(Packet::SubAck { packet_id }).await?;
            }
            (Packet::Unsubscribe { packet_id, filters }, Role::Subscriber) => {
                for raw in &filters {
                    let filter = TopicFilter::new(raw)?;
                    self.ctx.table.unsubscribe(self.id, &filter);
                }
                self.send(Packet::UnsubAck { packet_id }).await?;
            }
            (Packet::Subscribe { .. } | Packet::Unsubscribe { .. }, Role::Publisher) => {
                return Err(ProtocolError::RoleViolation("publisher sent SUBSCRIBE").into());
            }
            (Packet::PubAck { message_id }, Role::Subscriber) => {
                if self.inflight.remove(&message_id).is_none() {
                    debug!("PUBACK for unknown message {} on {}", message_id, self.id);
                }
            }
            (Packet::PingReq, _) => self.send(Packet::PingResp).await?,
            (Packet::Disconnect, _) => return Ok(Some(Closed::PeerDisconnect)),
            (other, _) => return Err(ProtocolError::UnexpectedPacket(other.kind()).into()),
        }
        Ok(None)
    }

    async fn route(&self, topic: Topic, payload: Bytes) -> Result<(), SessionError> {
        let (done, routed) = oneshot::channel();
        self.ctx
            .router
            .send(RouterCommand::Publish {
                topic,
                payload,
                done: Some(done),
            })
            .await
            .map_err(|_| SessionError::RouterGone)?;
        // PUBACK only once the router has taken the message
        routed.await.map_err(|_| SessionError::RouterGone)?;
        Ok(())
    }

    async fn deliver(&mut self, delivery: Delivery) -> Result<(), SessionError> {
        self.send(Packet::Publish {
            dup: false,
            message_id: delivery.message_id,
            topic: delivery.topic.as_str().to_string(),
            payload: delivery.payload.clone(),
        })
        .await?;
        self.inflight.insert(
            delivery.message_id,
            Inflight {
                topic: delivery.topic,
                payload: delivery.payload,
                sent_at: Instant::now(),
                retransmits: 0,
            },
        );
        Ok(())
    }

    async fn retransmit_expired(&mut self) -> Result<(), SessionError> {
        let config = self.ctx.config.clone();
        let now = Instant::now();
        let expired: Vec<u64> = self
            .inflight
            .iter()
            .filter(|(_, f)| now.duration_since(f.sent_at) >= config.ack_timeout)
            .map(|(id, _)| *id)
            .collect();

        for message_id in expired {
            let Some(entry) = self.inflight.get_mut(&message_id) else {
                continue;
            };
            if entry.retransmits >= config.max_retransmits {
                return Err(SessionError::AckTimeout(message_id));
            }
            entry.retransmits += 1;
            entry.sent_at = now;
            let packet = Packet::Publish {
                dup: true,
                message_id,
                topic: entry.topic.as_str().to_string(),
                payload: entry.payload.clone(),
            };
            debug!("Retransmitting {} to {} (attempt {})", message_id, self.id, entry.retransmits);
            self.send(packet).await?;
        }
        Ok(())
    }

    async fn send(&mut self, packet: Packet) -> Result<(), ProtocolError> {
        self.conn.send(packet).await
    }
}
