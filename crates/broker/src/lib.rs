//! Tickcast Broker
//!
//! Embedded publish/subscribe broker. Provides:
//! - A length-prefixed binary wire protocol (CONNECT, SUBSCRIBE, PUBLISH, ...)
//! - Hierarchical topics with `+` / `#` wildcard filters
//! - At-least-once delivery to live subscribers (PUBACK + retransmit)
//! - Keep-alive windows that expire silent connections
//! - Transport traits so publishers don't care where the broker lives
//!
//! ## Architecture
//!
//! ```text
//!  RemotePublisher ──TCP──┐            ┌── session ──TCP──► Subscriber
//!                         ▼            │
//!  BrokerHandle ──────► Router ──► delivery queues (per connection)
//!   (in-process)      (single task,    │
//!                      sequence #s)    └── session ──TCP──► Subscriber
//!                         ▲
//!                 ConnectionTable (DashMap)
//! ```
//!
//! There is no replay: a subscriber only receives what is published after
//! its SUBSCRIBE is acknowledged, and must fetch current state separately.

pub mod client;
pub mod codec;
pub mod error;
pub mod router;
pub mod server;
pub mod table;
pub mod topic;
pub mod transport;

mod session;

// Re-export commonly used types
pub use client::{BrokerStream, ConnectOptions, RemotePublisher, connect, next_packet, subscribe};
pub use codec::{ConnAckCode, FrameCodec, PROTOCOL_VERSION, Packet, Role};
pub use error::{BrokerError, ProtocolError, TransportError};
pub use router::RouterStats;
pub use server::{Broker, BrokerConfig, BrokerHandle, BrokerStats};
pub use table::{ConnectionId, ConnectionInfo, ConnectionTable};
pub use topic::{Topic, TopicFilter};
pub use transport::{
    Publisher, Routed, Subscriber,
    channel::{ChannelPublisher, ChannelSubscriber},
    tcp::{BrokerPublisher, RemoteTopicPublisher},
};
