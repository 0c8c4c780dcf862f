//! Server bootstrap
//!
//! Wires the provider client, snapshot cache, broker (embedded or remote),
//! publisher loop and HTTP data endpoint around one shutdown token.

use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tickcast_broker::{
    Broker, BrokerHandle, BrokerPublisher, Publisher, RemotePublisher, RemoteTopicPublisher,
};
use tickcast_core::{Notification, Quote, snapshot_cache};
use tickcast_gateway::CoinMarketCapClient;
use tickcast_ports::Clock;
use tickcast_publisher::PriceFeedPublisher;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::{self, AppState};

/// Handles to a started server
pub struct RunningServer {
    publisher: Arc<PriceFeedPublisher>,
    broker: Option<Broker>,
    http_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Address of the embedded broker, `None` when publishing to an
    /// external one
    pub fn broker_addr(&self) -> Option<SocketAddr> {
        self.broker.as_ref().map(Broker::local_addr)
    }

    pub fn broker(&self) -> Option<BrokerHandle> {
        self.broker.as_ref().map(Broker::handle)
    }

    pub fn publisher(&self) -> &Arc<PriceFeedPublisher> {
        &self.publisher
    }

    /// Wait for every component to stop after shutdown
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
        if let Some(broker) = self.broker {
            broker.join().await;
        }
        info!("Server stopped");
    }
}

/// Bind everything and start the publisher loop.
///
/// All listeners are bound before the first fetch, so a bind failure
/// returns an error without touching the provider.
pub async fn start(
    config: ServerConfig,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> Result<RunningServer, ServerError> {
    let provider = Arc::new(CoinMarketCapClient::new(config.provider.clone(), clock.clone())?);
    let (writer, reader) = snapshot_cache();
    let topic = config.publisher.topic.clone();

    let (broker, notifications, quotes) = match &config.external_broker {
        Some(addr) => {
            let client_id = format!("tickcast-publisher-{}", Uuid::new_v4().simple());
            let remote = Arc::new(RemoteTopicPublisher::new(
                RemotePublisher::new(addr.as_str(), client_id),
                topic,
            ));
            info!("Publishing to external broker at {}", addr);
            let notifications: Arc<dyn Publisher<Notification>> = remote.clone();
            let quotes: Arc<dyn Publisher<Quote>> = remote;
            (None, notifications, quotes)
        }
        None => {
            let broker = Broker::start(config.broker.clone(), clock.clone(), shutdown.clone()).await?;
            let sink = Arc::new(BrokerPublisher::new(broker.handle(), topic));
            let notifications: Arc<dyn Publisher<Notification>> = sink.clone();
            let quotes: Arc<dyn Publisher<Quote>> = sink;
            (Some(broker), notifications, quotes)
        }
    };

    let http_addr = config.http_addr();
    let listener = TcpListener::bind(&http_addr)
        .await
        .map_err(|source| ServerError::HttpBind {
            addr: http_addr.clone(),
            source,
        })?;
    let local_http = listener.local_addr().map_err(|source| ServerError::HttpBind {
        addr: http_addr,
        source,
    })?;

    let publisher = Arc::new(
        PriceFeedPublisher::new(config.publisher.clone(), provider, writer, notifications)
            .with_quote_sink(quotes),
    );

    let mut state = AppState::new(reader, clock, config.stale_after).with_publisher(publisher.clone());
    if let Some(broker) = &broker {
        state = state.with_broker(broker.handle());
    }

    let http_shutdown = shutdown.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http::serve(listener, state, http_shutdown).await {
            warn!("HTTP data endpoint exited: {}", e);
        }
    });
    let publisher_task = tokio::spawn(publisher.clone().run(shutdown));

    info!(
        "Tickcast server started: {} symbols every {:?}, mode {}",
        config.publisher.symbols.len(),
        config.publisher.interval,
        config.publisher.mode
    );

    Ok(RunningServer {
        publisher,
        broker,
        http_addr: local_http,
        tasks: vec![http_task, publisher_task],
    })
}
