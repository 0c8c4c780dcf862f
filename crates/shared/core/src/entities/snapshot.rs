use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::quote::Quote;
use crate::values::{Symbol, Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot has no quotes")]
    Empty,

    #[error("duplicate quote for {0}")]
    Duplicate(Symbol),
}

/// The complete set of quotes produced by one successful provider fetch.
///
/// Immutable after construction. A newer fetch produces a new snapshot
/// that replaces this one as a whole; quotes from two fetches are never
/// merged into one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotWire", into = "SnapshotWire")]
pub struct PriceSnapshot {
    quotes: BTreeMap<Symbol, Quote>,
    fetched_at: Timestamp,
}

impl PriceSnapshot {
    pub fn from_quotes(
        quotes: impl IntoIterator<Item = Quote>,
        fetched_at: Timestamp,
    ) -> Result<Self, SnapshotError> {
        let mut map = BTreeMap::new();
        for quote in quotes {
            let symbol = quote.symbol.clone();
            if map.insert(symbol.clone(), quote).is_some() {
                return Err(SnapshotError::Duplicate(symbol));
            }
        }
        if map.is_empty() {
            return Err(SnapshotError::Empty);
        }
        Ok(Self {
            quotes: map,
            fetched_at,
        })
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    /// Quotes ordered by symbol
    pub fn quotes(&self) -> impl Iterator<Item = &Quote> {
        self.quotes.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.quotes.keys()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    /// Requested symbols this snapshot has no quote for
    pub fn missing<'a>(&self, requested: &'a [Symbol]) -> Vec<&'a Symbol> {
        requested
            .iter()
            .filter(|s| !self.quotes.contains_key(*s))
            .collect()
    }

    /// Age relative to `now`, clamped at zero for clock skew
    pub fn age(&self, now: Timestamp) -> chrono::Duration {
        (now - self.fetched_at).max(chrono::Duration::zero())
    }
}

/// Wire form: quotes as an ordered array rather than a map
#[derive(Serialize, Deserialize)]
struct SnapshotWire {
    fetched_at: Timestamp,
    quotes: Vec<Quote>,
}

impl TryFrom<SnapshotWire> for PriceSnapshot {
    type Error = SnapshotError;

    fn try_from(wire: SnapshotWire) -> Result<Self, Self::Error> {
        PriceSnapshot::from_quotes(wire.quotes, wire.fetched_at)
    }
}

impl From<PriceSnapshot> for SnapshotWire {
    fn from(snapshot: PriceSnapshot) -> Self {
        SnapshotWire {
            fetched_at: snapshot.fetched_at,
            quotes: snapshot.quotes.into_values().collect(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{quote, snapshot};
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rejects_duplicates_and_empty() {
        let dup = PriceSnapshot::from_quotes(
            vec![quote("BTC", dec!(1)), quote("btc", dec!(2))],
            Utc::now(),
        );
        assert_eq!(
            dup,
            Err(SnapshotError::Duplicate(Symbol::new("BTC").unwrap()))
        );
        assert_eq!(
            PriceSnapshot::from_quotes(Vec::new(), Utc::now()),
            Err(SnapshotError::Empty)
        );
    }

    #[test]
    fn test_missing_symbols() {
        let snap = snapshot(&[("BTC", dec!(67000)), ("ETH", dec!(3500))]);
        let requested = Symbol::parse_list("BTC,ETH,SOL").unwrap();
        let missing: Vec<&str> = snap.missing(&requested).iter().map(|s| s.as_str()).collect();
        assert_eq!(missing, vec!["SOL"]);
    }

    #[test]
    fn test_wire_form_is_quote_array() {
        let snap = snapshot(&[("ETH", dec!(3500)), ("BTC", dec!(67000.12))]);
        let json = serde_json::to_value(&snap).unwrap();
        let quotes = json["quotes"].as_array().unwrap();
        assert_eq!(quotes.len(), 2);
        // BTreeMap ordering
        assert_eq!(quotes[0]["symbol"], "BTC");

        let back: PriceSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_wire_form_rejects_duplicates() {
        let snap = snapshot(&[("BTC", dec!(1))]);
        let mut json = serde_json::to_value(&snap).unwrap();
        let first = json["quotes"][0].clone();
        json["quotes"].as_array_mut().unwrap().push(first);
        assert!(serde_json::from_value::<PriceSnapshot>(json).is_err());
    }
}
