//! Tickcast Runner - server process
//!
//! Wires the server side of the price feed together:
//!
//! - **Config**: `.env.server` plus environment variables
//! - **Provider**: CoinMarketCap client, the only holder of the API key
//! - **Publisher**: timer loop filling the snapshot cache and notifying
//! - **Broker**: embedded, or a TCP link to an external one
//! - **HTTP**: `/api/crypto-prices` and `/health`, read from the cache
//!
//! ## Architecture
//!
//! ```text
//!   CoinMarketCap ◄── fetch ── ┌────────────┐ ── set ──► SnapshotCache
//!                              │ Publisher  │                 │ get
//!                              └─────┬──────┘                 ▼
//!                                    │ notify          ┌──────────────┐
//!                                    ▼                 │ HTTP endpoint│
//!                              ┌────────────┐          └──────┬───────┘
//!                              │   Broker   │                 │ fetch_now
//!                              └─────┬──────┘                 │
//!                                    │ prices/update          │
//!                                    ▼                        ▼
//!                               subscribers ──────────────────┘
//! ```
//!
//! One `CancellationToken` stops the publisher, broker and HTTP server.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::ServerError;
pub use http::{AppState, Health, NO_DATA_YET, PublisherHealth};
pub use server::{RunningServer, start};
