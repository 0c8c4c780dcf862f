//! Price feed publisher
//!
//! One fixed-interval timer drives the whole cycle:
//!
//! ```text
//!  tick ──► Fetching ──ok──► cache.set ──► Publishing ──► Idle
//!              │
//!              └─err──► Backoff (cache untouched, wait for next tick)
//! ```
//!
//! A tick that fires while the previous cycle is still running is skipped,
//! so at most one provider request is ever outstanding.

use arc_swap::ArcSwapOption;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use tickcast_broker::Publisher;
use tickcast_core::{Notification, Quote, SnapshotReader, SnapshotWriter, symbol_topic};
use tickcast_ports::PriceProvider;

use crate::config::{NotificationMode, PublisherConfig};
use crate::state::{Counters, CycleOutcome, PublisherState, PublisherStats};

/// Releases the in-flight flag when the cycle ends, including on panic
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PriceFeedPublisher {
    config: PublisherConfig,
    provider: Arc<dyn PriceProvider>,
    cache: SnapshotWriter,
    notifications: Arc<dyn Publisher<Notification>>,
    quotes: Option<Arc<dyn Publisher<Quote>>>,
    in_flight: AtomicBool,
    sequence: AtomicU64,
    state: watch::Sender<PublisherState>,
    counters: Counters,
    /// Error of the latest completed fetch; cleared by the next success
    refresh_error: ArcSwapOption<String>,
}

impl PriceFeedPublisher {
    /// The publisher takes the cache's only writer.
    pub fn new(
        config: PublisherConfig,
        provider: Arc<dyn PriceProvider>,
        cache: SnapshotWriter,
        notifications: Arc<dyn Publisher<Notification>>,
    ) -> Self {
        let (state, _) = watch::channel(PublisherState::Idle);
        Self {
            config,
            provider,
            cache,
            notifications,
            quotes: None,
            in_flight: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            state,
            counters: Counters::default(),
            refresh_error: ArcSwapOption::empty(),
        }
    }

    /// Sink for the per-symbol quote topics. Only used when
    /// `publish_per_symbol` is set.
    pub fn with_quote_sink(mut self, sink: Arc<dyn Publisher<Quote>>) -> Self {
        self.quotes = Some(sink);
        self
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn reader(&self) -> SnapshotReader {
        self.cache.reader()
    }

    pub fn state(&self) -> PublisherState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<PublisherState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> PublisherStats {
        self.counters.snapshot()
    }

    /// Set while the cache holds data from before a failed refresh
    pub fn refresh_error(&self) -> Option<String> {
        self.refresh_error.load_full().map(|e| (*e).clone())
    }

    /// Run the timer loop until `shutdown` fires.
    ///
    /// The first tick is immediate so the cache fills at startup. Each cycle
    /// runs on its own task. Cancelling stops the timer and aborts a cycle
    /// still in flight, so the cache is never written after `run` returns.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            "Publisher started: {} symbols every {:?} ({} mode) on '{}'",
            self.config.symbols.len(),
            self.config.interval,
            self.config.mode,
            self.config.topic
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Publisher stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    cycles.spawn(async move {
                        this.run_cycle().await;
                    });
                }
                Some(_) = cycles.join_next(), if !cycles.is_empty() => {}
            }
        }

        if !cycles.is_empty() {
            debug!("Aborting {} cycle(s) in flight", cycles.len());
        }
        cycles.shutdown().await;
    }

    /// Run one fetch/publish cycle now, unless one is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let outcome = match InFlightGuard::acquire(&self.in_flight) {
            Some(_guard) => self.cycle().await,
            None => {
                debug!("Previous cycle still in flight, skipping tick");
                CycleOutcome::Skipped
            }
        };
        self.counters.record(&outcome);
        outcome
    }

    async fn cycle(&self) -> CycleOutcome {
        self.state.send_replace(PublisherState::Fetching);

        let snapshot = match self.provider.fetch_prices(&self.config.symbols).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.refresh_error.store(Some(Arc::new(e.to_string())));
                self.state.send_replace(PublisherState::Backoff);
                warn!(
                    "Fetch from {} failed [{}]: {} (serving previous snapshot)",
                    self.provider.name(),
                    e.class(),
                    e
                );
                return CycleOutcome::Failed(e);
            }
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let symbols = snapshot.len();
        let notification = match self.config.mode {
            NotificationMode::Marker => Notification::marker(sequence, &snapshot),
            NotificationMode::Payload => Notification::with_payload(sequence, snapshot.clone()),
        };
        let quotes: Vec<Quote> = match (&self.quotes, self.config.publish_per_symbol) {
            (Some(_), true) => snapshot.quotes().cloned().collect(),
            _ => Vec::new(),
        };

        self.cache.set(snapshot);
        self.refresh_error.store(None);
        self.state.send_replace(PublisherState::Publishing);

        let outcome = match self.notifications.publish(&notification).await {
            Ok(()) => {
                info!("Published update #{} ({} symbols)", sequence, symbols);
                CycleOutcome::Published { sequence, symbols }
            }
            Err(e) => {
                warn!("Update #{} cached but not published: {}", sequence, e);
                CycleOutcome::Undelivered {
                    sequence,
                    error: e.to_string(),
                }
            }
        };

        if let Some(sink) = &self.quotes {
            for quote in &quotes {
                if let Err(e) = sink.publish_to(&symbol_topic(&quote.symbol), quote).await {
                    warn!("Per-symbol publish for {} failed: {}", quote.symbol, e);
                }
            }
        }

        self.state.send_replace(PublisherState::Idle);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = InFlightGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(InFlightGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(InFlightGuard::acquire(&flag).is_some());
    }
}
