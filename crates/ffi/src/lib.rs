//! Tickcast C ABI
//!
//! Four functions make up the host-facing surface (see
//! `include/tickcast.h`):
//!
//! | Function | Ownership |
//! |---|---|
//! | `fetch_crypto_data()` | returns an [`OwnedBuffer`]; caller releases it |
//! | `fetch_historical_data(symbol, timeframe)` | borrows both strings for the call; returns an [`OwnedBuffer`] |
//! | `register_price_update_callback(cb)` | callback runs on the dispatch thread, never the caller's |
//! | `release_buffer(buf)` | frees a buffer; exactly once per buffer |
//!
//! Releasing a buffer twice, or never, is a host contract violation the
//! library cannot detect at runtime.

pub mod api;
pub mod buffer;
pub mod settings;

pub use api::{
    PriceUpdateCallback, fetch_crypto_data, fetch_historical_data, register_price_update_callback,
};
pub use buffer::{OwnedBuffer, release_buffer};
pub use settings::ClientSettings;
