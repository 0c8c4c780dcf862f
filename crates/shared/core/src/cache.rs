//! Latest-snapshot cache with atomic replacement
//!
//! The cache is split into a single [`SnapshotWriter`] (owned by the
//! publisher's fetch loop) and any number of cheap [`SnapshotReader`]s.
//! Readers never block and always see one whole snapshot: a `set` swaps a
//! pointer, it never edits the snapshot in place.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

use crate::entities::PriceSnapshot;
use crate::values::Timestamp;

/// Create an empty cache
pub fn snapshot_cache() -> (SnapshotWriter, SnapshotReader) {
    let slot = Arc::new(ArcSwapOption::empty());
    (
        SnapshotWriter { slot: slot.clone() },
        SnapshotReader { slot },
    )
}

/// Write half. Deliberately not `Clone`: whoever owns it is the only code
/// able to replace the cached snapshot.
pub struct SnapshotWriter {
    slot: Arc<ArcSwapOption<PriceSnapshot>>,
}

impl SnapshotWriter {
    pub fn set(&self, snapshot: PriceSnapshot) {
        self.slot.store(Some(Arc::new(snapshot)));
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            slot: self.slot.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SnapshotReader {
    slot: Arc<ArcSwapOption<PriceSnapshot>>,
}

impl SnapshotReader {
    pub fn get(&self) -> Option<Arc<PriceSnapshot>> {
        self.slot.load_full()
    }

    /// Fetch time of the cached snapshot, i.e. of the last successful fetch
    pub fn last_success(&self) -> Option<Timestamp> {
        self.slot.load().as_ref().map(|s| s.fetched_at())
    }
}
