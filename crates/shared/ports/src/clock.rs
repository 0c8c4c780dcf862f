use tickcast_core::Timestamp;

/// Port for time abstraction
///
/// Lets components stamp snapshots and judge staleness against either the
/// wall clock or a clock driven by hand in tests.
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
