mod notification;
mod quote;
mod snapshot;

pub use notification::{
    Notification, NotificationKind, PRICES_TOPIC, SYMBOL_TOPIC_PREFIX, symbol_topic,
};
pub use quote::Quote;
pub use snapshot::{PriceSnapshot, SnapshotError};

#[cfg(test)]
pub(crate) use snapshot::fixtures;
