//! Publisher state machine, cycle outcomes and counters

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tickcast_ports::FetchError;

/// `Idle -> Fetching -> (Publishing | Backoff) -> Idle`
///
/// `Backoff` holds until the next regular tick; there is no shortened retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherState {
    Idle,
    Fetching,
    Publishing,
    Backoff,
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PublisherState::Idle => "idle",
            PublisherState::Fetching => "fetching",
            PublisherState::Publishing => "publishing",
            PublisherState::Backoff => "backoff",
        };
        f.write_str(s)
    }
}

/// Result of one timer tick
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Cache replaced and notification accepted by the broker
    Published { sequence: u64, symbols: usize },
    /// Cache replaced but the notification could not be handed to the broker
    Undelivered { sequence: u64, error: String },
    /// Provider failed; cache left as it was
    Failed(FetchError),
    /// Previous cycle still in flight
    Skipped,
}

impl CycleOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, CycleOutcome::Published { .. })
    }
}

/// Point-in-time copy of the publisher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    pub published: u64,
    pub undelivered: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    published: AtomicU64,
    undelivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    pub(crate) fn record(&self, outcome: &CycleOutcome) {
        let counter = match outcome {
            CycleOutcome::Published { .. } => &self.published,
            CycleOutcome::Undelivered { .. } => &self.undelivered,
            CycleOutcome::Failed(_) => &self.failed,
            CycleOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_each_outcome() {
        let counters = Counters::default();
        counters.record(&CycleOutcome::Published { sequence: 1, symbols: 3 });
        counters.record(&CycleOutcome::Skipped);
        counters.record(&CycleOutcome::Skipped);
        counters.record(&CycleOutcome::Failed(FetchError::Network("down".into())));

        assert_eq!(
            counters.snapshot(),
            PublisherStats {
                published: 1,
                undelivered: 0,
                failed: 1,
                skipped: 2,
            }
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PublisherState::Backoff.to_string(), "backoff");
    }
}
