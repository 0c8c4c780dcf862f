//! Response bodies exchanged over the side-channel request path

mod history;
mod prices;

pub use history::{HistoricalPoint, HistoricalSeries, Timeframe, TimeframeError};
pub use prices::PricesResponse;
