//! Client side of the wire protocol
//!
//! Connection helpers shared by subscribers, plus [`RemotePublisher`] for
//! publishing into a broker running in another process.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tokio_util::codec::Framed;

use crate::codec::{ConnAckCode, DEFAULT_MAX_FRAME, FrameCodec, PROTOCOL_VERSION, Packet, Role};
use crate::error::{ProtocolError, TransportError};
use crate::topic::Topic;

pub type BrokerStream = Framed<TcpStream, FrameCodec>;

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub role: Role,
    pub client_id: String,
    /// Declared to the broker; 0 disables the broker-side window
    pub keep_alive: Duration,
    /// Bound on TCP connect plus handshake
    pub timeout: Duration,
    pub max_frame: usize,
}

impl ConnectOptions {
    pub fn new(role: Role, client_id: impl Into<String>) -> Self {
        Self {
            role,
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

/// Open a TCP connection and complete the CONNECT/CONNACK handshake.
/// Returns the stream and the connection id assigned by the broker.
pub async fn connect(
    addr: &str,
    options: &ConnectOptions,
) -> Result<(BrokerStream, String), TransportError> {
    timeout(options.timeout, connect_inner(addr, options))
        .await
        .map_err(|_| TransportError::Timeout)?
}

async fn connect_inner(
    addr: &str,
    options: &ConnectOptions,
) -> Result<(BrokerStream, String), TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| TransportError::Connection(format!("{}: {}", addr, e)))?;
    let _ = stream.set_nodelay(true);
    let mut conn = Framed::new(stream, FrameCodec::new(options.max_frame));

    let keep_alive_secs = u16::try_from(options.keep_alive.as_secs()).unwrap_or(u16::MAX);
    conn.send(Packet::Connect {
        protocol_version: PROTOCOL_VERSION,
        role: options.role,
        keep_alive_secs,
        client_id: options.client_id.clone(),
    })
    .await?;

    match next_packet(&mut conn).await? {
        Packet::ConnAck {
            code: ConnAckCode::Accepted,
            connection_id,
        } => Ok((conn, connection_id.unwrap_or_default())),
        Packet::ConnAck { code, .. } => Err(TransportError::Rejected(code)),
        other => Err(ProtocolError::UnexpectedPacket(other.kind()).into()),
    }
}

/// Subscribe to `filters` and wait for the SUBACK
pub async fn subscribe(
    conn: &mut BrokerStream,
    packet_id: u16,
    filters: &[String],
    wait: Duration,
) -> Result<(), TransportError> {
    conn.send(Packet::Subscribe {
        packet_id,
        filters: filters.to_vec(),
    })
    .await?;

    timeout(wait, wait_for_suback(conn, packet_id))
        .await
        .map_err(|_| TransportError::Timeout)?
}

async fn wait_for_suback(conn: &mut BrokerStream, packet_id: u16) -> Result<(), TransportError> {
    loop {
        match next_packet(conn).await? {
            Packet::SubAck { packet_id: acked } if acked == packet_id => return Ok(()),
            Packet::PingResp => continue,
            other => {
                return Err(TransportError::Subscribe(format!(
                    "expected SUBACK, got {}",
                    other.kind()
                )));
            }
        }
    }
}

/// Next packet, treating a closed stream as an error
pub async fn next_packet(conn: &mut BrokerStream) -> Result<Packet, TransportError> {
    match conn.next().await {
        Some(Ok(packet)) => Ok(packet),
        Some(Err(e)) => Err(e.into()),
        None => Err(TransportError::Connection("connection closed by broker".into())),
    }
}

struct Link {
    conn: BrokerStream,
    last_io: Instant,
}

/// Publisher connected to a broker over TCP
///
/// Each publish waits for the broker's PUBACK. If the link fails the
/// message is resent, with the same id and `dup` set, over a fresh
/// connection; the broker drops resent ids it has already routed. `dup`
/// is only set once the message has actually been written to a link.
pub struct RemotePublisher {
    addr: String,
    options: ConnectOptions,
    ack_timeout: Duration,
    max_attempts: u32,
    link: Mutex<Option<Link>>,
    next_id: AtomicU64,
}

impl RemotePublisher {
    pub fn new(addr: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            options: ConnectOptions::new(Role::Publisher, client_id),
            ack_timeout: Duration::from_secs(5),
            max_attempts: 3,
            link: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub async fn publish_bytes(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        let topic = Topic::new(topic)?;
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut link = self.link.lock().await;
        let mut last_err = TransportError::ChannelClosed;
        let mut sent = false;

        for attempt in 0..self.max_attempts {
            // The broker will have expired an idle link; replace it up front
            if link
                .as_ref()
                .is_some_and(|l| l.last_io.elapsed() >= self.options.keep_alive)
            {
                debug!("Publisher link idle past keep-alive, reconnecting");
                *link = None;
            }
            if link.is_none() {
                match connect(&self.addr, &self.options).await {
                    Ok((conn, id)) => {
                        info!("Publisher connected to {} ({})", self.addr, id);
                        *link = Some(Link {
                            conn,
                            last_io: Instant::now(),
                        });
                    }
                    Err(e) => {
                        warn!("Publisher connect to {} failed: {}", self.addr, e);
                        last_err = e;
                        tokio::time::sleep(Duration::from_millis(200 << attempt)).await;
                        continue;
                    }
                }
            }

            let Some(active) = link.as_mut() else {
                continue;
            };
            let packet = Packet::Publish {
                dup: sent,
                message_id,
                topic: topic.as_str().to_string(),
                payload: payload.clone(),
            };
            sent = true;
            match self.send_and_wait(&mut active.conn, packet, message_id).await {
                Ok(()) => {
                    active.last_io = Instant::now();
                    return Ok(());
                }
                Err(e) => {
                    warn!("Publish {} failed (attempt {}): {}", message_id, attempt + 1, e);
                    *link = None;
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn send_and_wait(
        &self,
        conn: &mut BrokerStream,
        packet: Packet,
        message_id: u64,
    ) -> Result<(), TransportError> {
        conn.send(packet).await?;
        timeout(self.ack_timeout, wait_for_puback(conn, message_id))
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    /// Send DISCONNECT and drop the link
    pub async fn close(&self) {
        if let Some(mut active) = self.link.lock().await.take() {
            let _ = active.conn.send(Packet::Disconnect).await;
        }
    }
}

async fn wait_for_puback(conn: &mut BrokerStream, message_id: u64) -> Result<(), TransportError> {
    loop {
        match next_packet(conn).await? {
            Packet::PubAck { message_id: acked } if acked == message_id => return Ok(()),
            // Stale ack from an earlier attempt
            Packet::PubAck { .. } | Packet::PingResp => continue,
            other => return Err(ProtocolError::UnexpectedPacket(other.kind()).into()),
        }
    }
}
