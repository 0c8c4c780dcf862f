use serde::{Deserialize, Serialize};

use crate::values::{Price, Symbol, Timestamp};

/// One asset's USD quote as captured by a single provider fetch.
///
/// Decimals travel as JSON numbers so host applications can read them
/// without a decimal library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Price,
    #[serde(with = "rust_decimal::serde::float")]
    pub percent_change_1h: Price,
    #[serde(with = "rust_decimal::serde::float")]
    pub percent_change_24h: Price,
    #[serde(with = "rust_decimal::serde::float")]
    pub percent_change_7d: Price,
    #[serde(with = "rust_decimal::serde::float")]
    pub market_cap: Price,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume_24h: Price,
    pub last_updated: Timestamp,
}
