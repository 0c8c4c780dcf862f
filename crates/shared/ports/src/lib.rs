//! Tickcast Ports
//!
//! Port definitions (traits) for the Tickcast system.
//! These define the boundaries between domain logic and infrastructure.

mod clock;
mod error;
mod prices;

pub use clock::Clock;
pub use error::{FetchError, FetchResult};
pub use prices::{CurrentPrices, HistorySource, PriceProvider, SnapshotSource};
