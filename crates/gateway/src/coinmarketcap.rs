//! CoinMarketCap quotes client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tickcast_core::{PriceSnapshot, Quote, Symbol, Timestamp};
use tickcast_ports::{Clock, FetchError, FetchResult, PriceProvider};

use crate::config::ProviderConfig;
use crate::error::RestError;

const QUOTES_PATH: &str = "/v1/cryptocurrency/quotes/latest";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";
const MAX_ERROR_BODY: usize = 200;

/// REST client for the CoinMarketCap pro API
/// Infrastructure component - owns the API key, never exposed to clients
#[derive(Clone)]
pub struct CoinMarketCapClient {
    client: Client,
    config: ProviderConfig,
    clock: Arc<dyn Clock>,
}

impl CoinMarketCapClient {
    pub fn new(config: ProviderConfig, clock: Arc<dyn Clock>) -> Result<Self, RestError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            clock,
        })
    }

    /// Raw `quotes/latest` call for the given symbols
    pub async fn quotes_latest(&self, symbols: &[Symbol]) -> Result<QuotesEnvelope, RestError> {
        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}{}", self.config.base_url, QUOTES_PATH);

        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose())
            .header("Accept", "application/json")
            .query(&[("symbol", joined.as_str()), ("convert", self.config.convert.as_str())])
            .send()
            .await?;

        self.handle_response(resp).await
    }

    async fn handle_response(&self, resp: reqwest::Response) -> Result<QuotesEnvelope, RestError> {
        let status = resp.status();
        let retry_after_secs = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<QuotesEnvelope>(&text)
                .ok()
                .and_then(|env| env.status.error_message)
                .unwrap_or_else(|| truncate(&text));
            return Err(RestError::Status {
                status: status.as_u16(),
                message,
                retry_after_secs: retry_after_secs.filter(|_| status == StatusCode::TOO_MANY_REQUESTS),
            });
        }

        let envelope: QuotesEnvelope =
            serde_json::from_str(&text).map_err(|e| RestError::Parse(e.to_string()))?;
        if envelope.status.error_code != 0 {
            return Err(RestError::Api {
                code: envelope.status.error_code,
                message: envelope.status.error_message.unwrap_or_default(),
            });
        }
        Ok(envelope)
    }
}

#[async_trait]
impl PriceProvider for CoinMarketCapClient {
    async fn fetch_prices(&self, symbols: &[Symbol]) -> FetchResult<PriceSnapshot> {
        if symbols.is_empty() {
            return Err(FetchError::InvalidRequest("symbol set is empty".into()));
        }
        let symbols = distinct(symbols);
        debug!("Fetching {} symbols from {}", symbols.len(), self.name());

        let envelope = self.quotes_latest(&symbols).await?;
        let snapshot = build_snapshot(&symbols, envelope, &self.config.convert, self.clock.now())?;

        debug!("Fetched {} quotes", snapshot.len());
        Ok(snapshot)
    }

    fn name(&self) -> &str {
        "coinmarketcap"
    }
}

/// Top-level `quotes/latest` response
#[derive(Debug, Deserialize)]
pub struct QuotesEnvelope {
    pub status: ApiStatus,
    #[serde(default)]
    pub data: HashMap<String, Listing>,
}

#[derive(Debug, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Listing {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub quote: HashMap<String, ListingQuote>,
}

/// Every field optional: the provider sends `null` for values it lacks, and
/// a missing value has to surface as an incomplete response, not a parse error.
#[derive(Debug, Deserialize)]
pub struct ListingQuote {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub percent_change_1h: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub percent_change_24h: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub percent_change_7d: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub market_cap: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub volume_24h: Option<Decimal>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Assemble a snapshot holding exactly the requested symbols.
///
/// Any requested symbol absent from the response, or present with a null
/// field, fails the whole fetch as `Incomplete`. Unrequested extras are
/// dropped, and a symbol requested twice is matched once.
pub fn build_snapshot(
    requested: &[Symbol],
    mut envelope: QuotesEnvelope,
    convert: &str,
    fetched_at: Timestamp,
) -> FetchResult<PriceSnapshot> {
    let requested = distinct(requested);
    let mut quotes = Vec::with_capacity(requested.len());
    let mut missing = Vec::new();

    for symbol in &requested {
        let Some(mut listing) = envelope.data.remove(symbol.as_str()) else {
            missing.push(symbol.to_string());
            continue;
        };
        let Some(q) = listing.quote.remove(convert) else {
            missing.push(format!("{}.quote.{}", symbol, convert));
            continue;
        };

        let mut field = |name: &str, value: Option<Decimal>| match value {
            Some(v) => Some(v),
            None => {
                missing.push(format!("{}.{}", symbol, name));
                None
            }
        };
        let price = field("price", q.price);
        let change_1h = field("percent_change_1h", q.percent_change_1h);
        let change_24h = field("percent_change_24h", q.percent_change_24h);
        let change_7d = field("percent_change_7d", q.percent_change_7d);
        let market_cap = field("market_cap", q.market_cap);
        let volume = field("volume_24h", q.volume_24h);

        let Some(last_updated) = q.last_updated else {
            missing.push(format!("{}.last_updated", symbol));
            continue;
        };

        if let (Some(price), Some(c1), Some(c24), Some(c7), Some(cap), Some(vol)) =
            (price, change_1h, change_24h, change_7d, market_cap, volume)
        {
            quotes.push(Quote {
                symbol: symbol.clone(),
                name: listing.name,
                price,
                percent_change_1h: c1,
                percent_change_24h: c24,
                percent_change_7d: c7,
                market_cap: cap,
                volume_24h: vol,
                last_updated,
            });
        }
    }

    if !missing.is_empty() {
        warn!("Rejecting incomplete provider response: {}", missing.join(","));
        return Err(FetchError::Incomplete { missing });
    }

    PriceSnapshot::from_quotes(quotes, fetched_at).map_err(|e| FetchError::Malformed(e.to_string()))
}

/// First occurrence of each symbol, in request order
fn distinct(symbols: &[Symbol]) -> Vec<Symbol> {
    let mut seen = HashSet::with_capacity(symbols.len());
    symbols
        .iter()
        .filter(|s| seen.insert(*s))
        .cloned()
        .collect()
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
