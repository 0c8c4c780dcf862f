use serde::{Deserialize, Serialize};

use crate::entities::{PriceSnapshot, Quote, SnapshotError};
use crate::values::Timestamp;

/// Body of the synchronous price request, shared by the HTTP data endpoint
/// and the FFI `fetch_crypto_data` call.
///
/// `cached` signals degraded data: either the snapshot is older than the
/// staleness threshold or the latest fetch failed and last-known-good data
/// is being served instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricesResponse {
    pub success: bool,
    pub data: Vec<Quote>,
    pub error: Option<String>,
    pub cached: bool,
    pub last_updated: Option<Timestamp>,
}

impl PricesResponse {
    pub fn from_snapshot(
        snapshot: &PriceSnapshot,
        now: Timestamp,
        stale_after: chrono::Duration,
    ) -> Self {
        Self {
            success: true,
            data: snapshot.quotes().cloned().collect(),
            error: None,
            cached: snapshot.age(now) > stale_after,
            last_updated: Some(snapshot.fetched_at()),
        }
    }

    /// Last-known-good data served after a failed refresh
    pub fn degraded(snapshot: &PriceSnapshot, error: impl Into<String>) -> Self {
        Self {
            success: true,
            data: snapshot.quotes().cloned().collect(),
            error: Some(error.into()),
            cached: true,
            last_updated: Some(snapshot.fetched_at()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            error: Some(error.into()),
            cached: false,
            last_updated: None,
        }
    }

    /// Rebuild the snapshot a successful response was produced from
    pub fn into_snapshot(self, fallback_time: Timestamp) -> Result<PriceSnapshot, SnapshotError> {
        PriceSnapshot::from_quotes(self.data, self.last_updated.unwrap_or(fallback_time))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"data":[],"error":"serialization failed: {}","cached":false,"last_updated":null}}"#,
                e
            )
        })
    }
}
