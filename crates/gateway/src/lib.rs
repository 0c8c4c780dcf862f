//! Tickcast Gateway
//!
//! Provider gateway for the Tickcast system. Fetches current quotes for the
//! tracked symbol set from the upstream market-data API and turns them into
//! a [`PriceSnapshot`](tickcast_core::PriceSnapshot).
//!
//! ## Architecture
//!
//! ```text
//! CoinMarketCap REST API
//!         │  X-CMC_PRO_API_KEY (server side only)
//!    ┌────▼──────────────┐
//!    │ CoinMarketCap     │  RestError ──► FetchError
//!    │ Client            │
//!    └────┬──────────────┘
//!         │ PriceProvider::fetch_prices
//!    ┌────▼────┐
//!    │Publisher│
//!    └─────────┘
//! ```
//!
//! A response either yields a quote for every requested symbol or is
//! rejected whole; see [`coinmarketcap::build_snapshot`].

pub mod coinmarketcap;
pub mod config;
pub mod error;

pub use coinmarketcap::CoinMarketCapClient;
pub use config::{ApiKey, DEFAULT_BASE_URL, ProviderConfig};
pub use error::RestError;
