//! Side-channel sources for `fetch_now` and historical series

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::Client;
use std::time::Duration;

use tickcast_core::{HistoricalSeries, PricesResponse, SnapshotReader, Symbol, Timeframe};
use tickcast_ports::{CurrentPrices, FetchError, FetchResult, HistorySource, SnapshotSource};

use crate::error::ClientError;

const PRICES_PATH: &str = "/api/crypto-prices";
const HISTORY_PATH: &str = "/api/historical";

/// Reads the server's data endpoint over HTTP
#[derive(Clone)]
pub struct HttpDataClient {
    client: Client,
    base_url: String,
}

impl HttpDataClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> FetchResult<T> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        // The data endpoint reports failures in the body; only trust the
        // status line when the body isn't ours.
        match serde_json::from_str::<T>(&text) {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => {
                Err(FetchError::Network(format!("data endpoint returned {}", status)))
            }
            Err(e) => Err(FetchError::Malformed(e.to_string())),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpDataClient {
    async fn current(&self) -> FetchResult<CurrentPrices> {
        let url = format!("{}{}", self.base_url, PRICES_PATH);
        let body: PricesResponse = self.get_json(&url).await?;
        if !body.success {
            return Err(FetchError::Unavailable(
                body.error.unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }
        if body.cached {
            debug!("Server is serving cached data: {:?}", body.error);
        }
        CurrentPrices::from_response(body, Utc::now())
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[async_trait]
impl HistorySource for HttpDataClient {
    async fn history(&self, symbol: &Symbol, timeframe: Timeframe) -> FetchResult<HistoricalSeries> {
        let url = format!(
            "{}{}/{}?timeframe={}",
            self.base_url,
            HISTORY_PATH,
            symbol,
            timeframe.as_str()
        );
        self.get_json(&url).await
    }
}

/// Direct read of an in-process cache (server-embedded client)
#[derive(Clone)]
pub struct CacheSource {
    reader: SnapshotReader,
}

impl CacheSource {
    pub fn new(reader: SnapshotReader) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl SnapshotSource for CacheSource {
    async fn current(&self) -> FetchResult<CurrentPrices> {
        self.reader
            .get()
            .map(|snapshot| CurrentPrices::fresh((*snapshot).clone()))
            .ok_or_else(|| FetchError::Unavailable("no price data available yet".to_string()))
    }

    fn name(&self) -> &str {
        "cache"
    }
}
