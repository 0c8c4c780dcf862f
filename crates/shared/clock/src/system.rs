use chrono::Utc;
use tickcast_core::Timestamp;
use tickcast_ports::Clock;

/// UTC wall clock.
///
/// Stamps provider fetches and is what the data endpoint measures snapshot
/// age against. Clients on another host may run ahead of the server; a
/// snapshot stamped in their future simply has zero age.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "system"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use tickcast_core::{PriceSnapshot, Quote, Symbol};

    fn stamped(at: Timestamp) -> PriceSnapshot {
        let quote = Quote {
            symbol: Symbol::new("BTC").unwrap(),
            name: "Bitcoin".into(),
            price: Decimal::ONE,
            percent_change_1h: Decimal::ZERO,
            percent_change_24h: Decimal::ZERO,
            percent_change_7d: Decimal::ZERO,
            market_cap: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            last_updated: at,
        };
        PriceSnapshot::from_quotes(vec![quote], at).unwrap()
    }

    #[test]
    fn test_snapshot_ages_with_wall_time() {
        let clock = SystemClock::new();
        let snapshot = stamped(clock.now());
        std::thread::sleep(std::time::Duration::from_millis(10));

        let age = snapshot.age(clock.now());
        assert!(age >= Duration::milliseconds(9));
        assert!(age < Duration::seconds(5));
    }

    #[test]
    fn test_snapshot_from_a_clock_ahead_has_zero_age() {
        let clock = SystemClock::new();
        let snapshot = stamped(clock.now() + Duration::minutes(2));
        assert_eq!(snapshot.age(clock.now()), Duration::zero());
    }
}
