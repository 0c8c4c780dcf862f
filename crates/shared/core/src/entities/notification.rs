use serde::{Deserialize, Serialize};

use super::snapshot::PriceSnapshot;
use crate::values::{Symbol, Timestamp};

/// Topic carrying one notification per successful fetch cycle
pub const PRICES_TOPIC: &str = "prices/update";

/// Prefix of the optional per-symbol topics (`prices/symbol/BTC`)
pub const SYMBOL_TOPIC_PREFIX: &str = "prices/symbol";

pub fn symbol_topic(symbol: &Symbol) -> String {
    format!("{}/{}", SYMBOL_TOPIC_PREFIX, symbol)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// New data exists; fetch it over the side channel
    UpdateAvailable,
    /// The full snapshot is embedded in the message
    Snapshot,
}

/// Message published on [`PRICES_TOPIC`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Publisher-side cycle counter, increasing by one per published snapshot
    pub sequence: u64,
    pub last_updated: Timestamp,
    pub symbols: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PriceSnapshot>,
}

impl Notification {
    pub fn marker(sequence: u64, snapshot: &PriceSnapshot) -> Self {
        Self {
            kind: NotificationKind::UpdateAvailable,
            sequence,
            last_updated: snapshot.fetched_at(),
            symbols: snapshot.len(),
            snapshot: None,
        }
    }

    pub fn with_payload(sequence: u64, snapshot: PriceSnapshot) -> Self {
        Self {
            kind: NotificationKind::Snapshot,
            sequence,
            last_updated: snapshot.fetched_at(),
            symbols: snapshot.len(),
            snapshot: Some(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::snapshot::fixtures::snapshot;
    use rust_decimal_macros::dec;

    #[test]
    fn test_marker_has_no_payload() {
        let snap = snapshot(&[("BTC", dec!(67000.12))]);
        let json = serde_json::to_value(Notification::marker(7, &snap)).unwrap();
        assert_eq!(json["kind"], "update_available");
        assert_eq!(json["sequence"], 7);
        assert!(json.get("snapshot").is_none());
    }

    #[test]
    fn test_payload_notification_parses_back() {
        let snap = snapshot(&[("BTC", dec!(67000.12)), ("ETH", dec!(3500))]);
        let msg = Notification::with_payload(1, snap.clone());
        let bytes = serde_json::to_vec(&msg).unwrap();
        let parsed: Notification = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.kind, NotificationKind::Snapshot);
        assert_eq!(parsed.snapshot, Some(snap));
    }

    #[test]
    fn test_symbol_topic() {
        let btc = Symbol::new("btc").unwrap();
        assert_eq!(symbol_topic(&btc), "prices/symbol/BTC");
    }
}
