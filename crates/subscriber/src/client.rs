//! Synchronous client facade
//!
//! [`PriceClient`] owns a small tokio runtime that hosts the broker
//! connection loop, plus the dispatch thread that runs host callbacks.
//! Its own methods are blocking and meant for host threads; calling them
//! from inside an async context panics.

use arc_swap::ArcSwapOption;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tickcast_core::{HistoricalSeries, PriceSnapshot, PricesResponse, Symbol, Timeframe};
use tickcast_ports::{CurrentPrices, FetchError, FetchResult, HistorySource, SnapshotSource};

use crate::config::SubscriberConfig;
use crate::connection::{self, ConnectionState, Shared};
use crate::dispatch::{CallbackSlot, UpdateCallback, UpdateEvent, spawn_dispatcher};
use crate::error::ClientError;

/// A fetched snapshot plus the server's degraded flags
struct Served {
    snapshot: Arc<PriceSnapshot>,
    cached: bool,
    error: Option<String>,
}

pub struct PriceClient {
    runtime: Runtime,
    config: Arc<SubscriberConfig>,
    source: Arc<dyn SnapshotSource>,
    history: Option<Arc<dyn HistorySource>>,
    shared: Arc<Shared>,
    callbacks: CallbackSlot,
    last_good: ArcSwapOption<PriceSnapshot>,
    shutdown: CancellationToken,
}

impl PriceClient {
    /// Start the connection loop and dispatch thread.
    ///
    /// Returns as soon as both are running; the first connect happens in
    /// the background and its failure only schedules a retry.
    pub fn start(
        config: SubscriberConfig,
        source: Arc<dyn SnapshotSource>,
        history: Option<Arc<dyn HistorySource>>,
    ) -> Result<Self, ClientError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tickcast-client")
            .enable_all()
            .build()
            .map_err(ClientError::Runtime)?;

        let config = Arc::new(config);
        let shared = Arc::new(Shared::new(&config));
        let callbacks = CallbackSlot::default();
        let shutdown = CancellationToken::new();

        let (events_tx, events_rx) = mpsc::channel(config.dispatch_capacity.max(1));
        spawn_dispatcher(events_rx, callbacks.clone()).map_err(ClientError::Dispatcher)?;

        runtime.spawn(connection::run(
            config.clone(),
            shared.clone(),
            events_tx,
            shutdown.clone(),
        ));

        info!(
            "Price client started (broker {}, side channel {})",
            config.broker_addr,
            source.name()
        );

        Ok(Self {
            runtime,
            config,
            source,
            history,
            shared,
            callbacks,
            last_good: ArcSwapOption::empty(),
            shutdown,
        })
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Block until the connection reaches `state` or `wait` elapses
    pub fn wait_for_state(&self, state: ConnectionState, wait: Duration) -> bool {
        let mut rx = self.subscribe_state();
        self.runtime.block_on(async {
            timeout(wait, rx.wait_for(|s| *s == state))
                .await
                .is_ok_and(|r| r.is_ok())
        })
    }

    /// Consecutive failed reconnect attempts
    pub fn retry_attempt(&self) -> u32 {
        self.shared.retry.lock().attempt()
    }

    /// Replace the update callback. It runs on the dispatch thread and
    /// should only schedule work, e.g. a later `fetch_now`.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        let callback: UpdateCallback = Arc::new(callback);
        if self.callbacks.register(callback) {
            debug!("Update callback replaced");
        }
    }

    pub fn clear_callback(&self) {
        self.callbacks.clear();
    }

    /// Most recent snapshot obtained by `fetch_now`
    pub fn last_snapshot(&self) -> Option<Arc<PriceSnapshot>> {
        self.last_good.load_full()
    }

    /// Request current prices over the side channel, regardless of the
    /// broker connection state.
    pub fn fetch_now(&self) -> FetchResult<Arc<PriceSnapshot>> {
        self.fetch_current().map(|served| served.snapshot)
    }

    fn fetch_current(&self) -> FetchResult<Served> {
        let result = self.runtime.block_on(async {
            timeout(self.config.request_timeout, self.source.current())
                .await
                .unwrap_or_else(|_| Err(FetchError::Network("request timed out".to_string())))
        });

        match result {
            Ok(CurrentPrices {
                snapshot,
                cached,
                error,
            }) => {
                let snapshot = Arc::new(snapshot);
                self.last_good.store(Some(snapshot.clone()));
                self.shared.retry.lock().reset();
                debug!("fetch_now: {} symbols (cached={})", snapshot.len(), cached);
                Ok(Served {
                    snapshot,
                    cached,
                    error,
                })
            }
            Err(e) => {
                warn!("fetch_now via {} failed [{}]: {}", self.source.name(), e.class(), e);
                Err(e)
            }
        }
    }

    /// `fetch_now` shaped for the host. The result is flagged `cached` when
    /// the server says its data is degraded, when the snapshot is older than
    /// `stale_after`, or when the refresh failed and last-known-good data
    /// is served instead.
    pub fn prices_response(&self) -> PricesResponse {
        match self.fetch_current() {
            Ok(served) => {
                let stale_after = chrono::Duration::from_std(self.config.stale_after)
                    .unwrap_or(chrono::Duration::MAX);
                let mut response =
                    PricesResponse::from_snapshot(&served.snapshot, Utc::now(), stale_after);
                response.cached |= served.cached;
                response.error = served.error;
                response
            }
            Err(e) => match self.last_good.load_full() {
                Some(previous) => PricesResponse::degraded(&previous, e.to_string()),
                None => PricesResponse::failure(e.to_string()),
            },
        }
    }

    /// Historical series for `symbol`; invalid input is answered without a
    /// network call.
    pub fn historical(&self, symbol: &str, timeframe: &str) -> HistoricalSeries {
        let symbol = match Symbol::new(symbol) {
            Ok(s) => s,
            Err(e) => return HistoricalSeries::failure(Some(symbol), Some(timeframe), e.to_string()),
        };
        let timeframe = match timeframe.parse::<Timeframe>() {
            Ok(t) => t,
            Err(e) => {
                return HistoricalSeries::failure(Some(symbol.as_str()), Some(timeframe), e.to_string());
            }
        };
        let Some(history) = &self.history else {
            return HistoricalSeries::failure(
                Some(symbol.as_str()),
                Some(timeframe.as_str()),
                "historical data source not configured",
            );
        };

        let result = self.runtime.block_on(async {
            timeout(self.config.request_timeout, history.history(&symbol, timeframe))
                .await
                .unwrap_or_else(|_| Err(FetchError::Network("request timed out".to_string())))
        });
        result.unwrap_or_else(|e| {
            warn!("History {} {} failed [{}]: {}", symbol, timeframe, e.class(), e);
            HistoricalSeries::failure(Some(symbol.as_str()), Some(timeframe.as_str()), e.to_string())
        })
    }

    /// Stop reconnecting and close the broker session. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Price client shutting down");
            self.shutdown.cancel();
        }
    }
}

impl Drop for PriceClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
