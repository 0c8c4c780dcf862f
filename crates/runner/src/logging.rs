//! Logger setup for the server binary

use log::{LevelFilter, warn};

/// Parse `OFF|ERROR|WARN|INFO|DEBUG|TRACE`, any case
pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    raw.trim().parse().ok()
}

/// Install `env_logger` at the level named by `raw`.
///
/// An unknown level falls back to `INFO` and is reported once the logger
/// is up. Calling this twice keeps the first logger.
pub fn init(raw: &str) -> LevelFilter {
    let level = parse_level(raw);
    let filter = level.unwrap_or(LevelFilter::Info);

    let _ = env_logger::Builder::new()
        .filter_level(filter)
        .format_timestamp_millis()
        .try_init();

    if level.is_none() {
        warn!("Unknown LOG_LEVEL {:?}, using INFO", raw);
    }
    filter
}
