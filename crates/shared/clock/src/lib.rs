//! Tickcast Clock Infrastructure
//!
//! - [`SystemClock`]: wall-clock time for production
//! - [`ManualClock`]: time that only moves when a test advances it
//!
//! ```ignore
//! use tickcast_clock::{Clock, ManualClock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_at(start);
//! clock.advance(Duration::seconds(31));
//! assert!(snapshot.age(clock.now()) > stale_after);
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use tickcast_ports::Clock;
