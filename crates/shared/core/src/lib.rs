//! Tickcast Core Domain
//!
//! Pure domain types for the Tickcast price distribution system.
//! This crate contains no async and no I/O.

pub mod api;
pub mod cache;
pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use api::{HistoricalPoint, HistoricalSeries, PricesResponse, Timeframe, TimeframeError};
pub use cache::{SnapshotReader, SnapshotWriter, snapshot_cache};
pub use entities::{
    Notification, NotificationKind, PRICES_TOPIC, PriceSnapshot, Quote, SYMBOL_TOPIC_PREFIX,
    SnapshotError, symbol_topic,
};
pub use values::{Price, Symbol, SymbolError, Timestamp};
