use async_trait::async_trait;
use tickcast_core::{
    HistoricalSeries, PriceSnapshot, PricesResponse, SnapshotError, Symbol, Timeframe, Timestamp,
};

use crate::error::FetchResult;

/// Port for the upstream market-data provider
///
/// Implementations either return a snapshot holding a quote for every
/// requested symbol or fail; a subset is never returned.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_prices(&self, symbols: &[Symbol]) -> FetchResult<PriceSnapshot>;

    fn name(&self) -> &str {
        "PriceProvider"
    }
}

/// A snapshot as the side channel reported it
///
/// `cached` and `error` carry the server's own view: set when it is serving
/// last-known-good data because its latest refresh failed or aged out.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentPrices {
    pub snapshot: PriceSnapshot,
    pub cached: bool,
    pub error: Option<String>,
}

impl CurrentPrices {
    pub fn fresh(snapshot: PriceSnapshot) -> Self {
        Self {
            snapshot,
            cached: false,
            error: None,
        }
    }

    /// Split a successful data-endpoint body into snapshot and flags
    pub fn from_response(
        response: PricesResponse,
        fallback_time: Timestamp,
    ) -> Result<Self, SnapshotError> {
        let cached = response.cached;
        let error = response.error.clone();
        Ok(Self {
            snapshot: response.into_snapshot(fallback_time)?,
            cached,
            error,
        })
    }
}

/// Port for the synchronous side channel behind `fetch_now`
///
/// Either an in-process read of the server cache or a request against the
/// server's data endpoint.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn current(&self) -> FetchResult<CurrentPrices>;

    fn name(&self) -> &str {
        "SnapshotSource"
    }
}

/// Port for the historical-series collaborator
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn history(&self, symbol: &Symbol, timeframe: Timeframe) -> FetchResult<HistoricalSeries>;
}
