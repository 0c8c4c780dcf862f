//! HTTP data endpoint
//!
//! - `GET /api/crypto-prices` - the cached snapshot as a `PricesResponse`
//! - `GET /health` - cache, publisher and broker status
//!
//! Handlers only read the snapshot cache; they never call the provider.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tickcast_broker::{BrokerHandle, BrokerStats};
use tickcast_core::{PricesResponse, SnapshotReader, Timestamp};
use tickcast_ports::Clock;
use tickcast_publisher::{PriceFeedPublisher, PublisherState, PublisherStats};

pub const NO_DATA_YET: &str = "no price data available yet";

#[derive(Clone)]
pub struct AppState {
    reader: SnapshotReader,
    clock: Arc<dyn Clock>,
    stale_after: chrono::Duration,
    publisher: Option<Arc<PriceFeedPublisher>>,
    broker: Option<BrokerHandle>,
}

impl AppState {
    pub fn new(reader: SnapshotReader, clock: Arc<dyn Clock>, stale_after: Duration) -> Self {
        Self {
            reader,
            clock,
            stale_after: chrono::Duration::from_std(stale_after)
                .unwrap_or(chrono::Duration::MAX),
            publisher: None,
            broker: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<PriceFeedPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Only set when the broker is embedded in this process
    pub fn with_broker(mut self, broker: BrokerHandle) -> Self {
        self.broker = Some(broker);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct PublisherHealth {
    pub state: PublisherState,
    #[serde(flatten)]
    pub stats: PublisherStats,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub has_data: bool,
    pub last_updated: Option<Timestamp>,
    pub publisher: Option<PublisherHealth>,
    pub broker: Option<BrokerStats>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/crypto-prices", get(crypto_prices))
        .route("/health", get(health))
        .with_state(state)
}

/// `cached` is set when the snapshot is older than `stale_after` or the
/// latest refresh failed; the refresh error is passed on as `error`.
async fn crypto_prices(State(state): State<AppState>) -> (StatusCode, Json<PricesResponse>) {
    let Some(snapshot) = state.reader.get() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(PricesResponse::failure(NO_DATA_YET)),
        );
    };

    let response = match state.publisher.as_ref().and_then(|p| p.refresh_error()) {
        Some(error) => PricesResponse::degraded(&snapshot, format!("refresh failed: {}", error)),
        None => PricesResponse::from_snapshot(&snapshot, state.clock.now(), state.stale_after),
    };
    (StatusCode::OK, Json(response))
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        has_data: state.reader.get().is_some(),
        last_updated: state.reader.last_success(),
        publisher: state.publisher.as_ref().map(|p| PublisherHealth {
            state: p.state(),
            stats: p.stats(),
        }),
        broker: state.broker.as_ref().map(BrokerHandle::stats),
    })
}

/// Serve until `shutdown` is cancelled, then drain in-flight requests
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!("HTTP data endpoint listening on {}", addr);

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("HTTP server received shutdown signal");
        })
        .await;

    match &result {
        Ok(()) => info!("HTTP server shutdown complete"),
        Err(e) => error!("HTTP server error: {}", e),
    }
    result
}
