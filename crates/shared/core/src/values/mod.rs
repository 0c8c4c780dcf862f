use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

const MAX_SYMBOL_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("symbol is empty")]
    Empty,

    #[error("symbol too long: {0}")]
    TooLong(String),

    #[error("symbol contains invalid character: {0:?}")]
    InvalidChar(String),
}

/// Ticker symbol of a tracked asset (e.g. `BTC`)
///
/// Always trimmed and upper-cased, so `" btc"` and `"BTC"` name the same
/// asset everywhere: snapshot keys, topics and provider queries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, SymbolError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(SymbolError::Empty);
        }
        if normalized.len() > MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong(normalized));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(SymbolError::InvalidChar(normalized));
        }
        Ok(Self(normalized))
    }

    /// Parse a comma-separated list such as `"btc, eth,SOL"`, skipping blanks
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, SymbolError> {
        let mut symbols = Vec::new();
        for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
            let symbol = Self::new(part)?;
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        Ok(symbols)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = SymbolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}
