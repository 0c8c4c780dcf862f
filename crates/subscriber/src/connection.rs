//! Broker connection loop
//!
//! `Disconnected -> Connecting -> Connected -> (Disconnected on failure)`,
//! forever, until shutdown. Between attempts the loop sleeps according to
//! [`RetryState`]; a successful connect resets it.

use futures_util::SinkExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, sleep};
use tokio_util::sync::CancellationToken;

use tickcast_broker::{
    BrokerStream, ConnectOptions, Packet, Role, TransportError, connect, next_packet, subscribe,
};
use tickcast_core::Notification;

use crate::config::SubscriberConfig;
use crate::dispatch::UpdateEvent;
use crate::retry::RetryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// State shared between the connection task and the client facade
pub(crate) struct Shared {
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) retry: Mutex<RetryState>,
}

impl Shared {
    pub(crate) fn new(config: &SubscriberConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            retry: Mutex::new(RetryState::new(config.backoff_base, config.backoff_max)),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

/// Suppresses redelivered messages within one broker session
#[derive(Debug, Default)]
pub(crate) struct DuplicateFilter {
    last_seen: Option<u64>,
}

impl DuplicateFilter {
    /// True if `message_id` is new and should be dispatched
    pub(crate) fn accept(&mut self, message_id: u64) -> bool {
        match self.last_seen {
            Some(last) if message_id <= last => false,
            _ => {
                self.last_seen = Some(message_id);
                true
            }
        }
    }
}

pub(crate) async fn run(
    config: Arc<SubscriberConfig>,
    shared: Arc<Shared>,
    events: mpsc::Sender<UpdateEvent>,
    shutdown: CancellationToken,
) {
    let mut connected_before = false;

    while !shutdown.is_cancelled() {
        shared.set_state(ConnectionState::Connecting);

        match open(&config).await {
            Ok(conn) => {
                shared.retry.lock().reset();
                shared.set_state(ConnectionState::Connected);
                info!("Subscribed to {:?} on {}", config.filters, config.broker_addr);

                if connected_before {
                    post(&events, UpdateEvent::Resync);
                }
                connected_before = true;

                match read_loop(conn, &config, &events, &shutdown).await {
                    Ok(()) => break,
                    Err(e) => warn!("Connection to {} lost: {}", config.broker_addr, e),
                }
            }
            Err(e) => warn!("Connect to {} failed: {}", config.broker_addr, e),
        }

        shared.set_state(ConnectionState::Disconnected);
        let (delay, attempt) = {
            let mut retry = shared.retry.lock();
            (retry.on_failure(Instant::now()), retry.attempt())
        };
        info!("Reconnecting in {:?} (attempt {})", delay, attempt);

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    debug!("Connection loop stopped");
}

async fn open(config: &SubscriberConfig) -> Result<BrokerStream, TransportError> {
    let mut options = ConnectOptions::new(Role::Subscriber, config.client_id.clone());
    options.keep_alive = config.keep_alive;
    options.timeout = config.connect_timeout;

    let (mut conn, connection_id) = connect(&config.broker_addr, &options).await?;
    debug!("Connected as {}", connection_id);
    subscribe(&mut conn, 1, &config.filters, config.connect_timeout).await?;
    Ok(conn)
}

/// Returns `Ok` only on shutdown
async fn read_loop(
    mut conn: BrokerStream,
    config: &SubscriberConfig,
    events: &mpsc::Sender<UpdateEvent>,
    shutdown: &CancellationToken,
) -> Result<(), TransportError> {
    let keep_alive = config.keep_alive.max(std::time::Duration::from_millis(100));
    let mut ping = interval_at(Instant::now() + keep_alive, keep_alive);
    let mut last_inbound = Instant::now();
    let mut duplicates = DuplicateFilter::default();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = conn.send(Packet::Disconnect).await;
                return Ok(());
            }
            _ = ping.tick() => {
                if last_inbound.elapsed() > keep_alive * 2 {
                    return Err(TransportError::Timeout);
                }
                conn.send(Packet::PingReq).await?;
            }
            packet = next_packet(&mut conn) => {
                last_inbound = Instant::now();
                match packet? {
                    Packet::Publish { message_id, topic, payload, dup } => {
                        conn.send(Packet::PubAck { message_id }).await?;
                        if !duplicates.accept(message_id) {
                            debug!("Duplicate delivery {} (dup={}) acknowledged", message_id, dup);
                            continue;
                        }
                        match serde_json::from_slice::<Notification>(&payload) {
                            Ok(notification) => post(events, UpdateEvent::Notification(notification)),
                            Err(e) => debug!("Ignoring non-notification message on '{}': {}", topic, e),
                        }
                    }
                    Packet::PingResp => {}
                    Packet::Disconnect => {
                        return Err(TransportError::Connection("broker ended the session".into()));
                    }
                    other => debug!("Ignoring unexpected {}", other.kind()),
                }
            }
        }
    }
}

/// Hand an event to the dispatcher without waiting on the host
fn post(events: &mpsc::Sender<UpdateEvent>, event: UpdateEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!("Dispatch queue full, dropping {:?}", event)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => debug!("Dispatcher gone"),
    }
}
