//! Error types for the broker crate

use thiserror::Error;

use crate::codec::ConnAckCode;

/// Violations of the wire protocol on a single connection.
///
/// Any of these closes the offending connection and nothing else.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("undecodable frame: {0}")]
    Decode(String),

    #[error("unencodable frame: {0}")]
    Encode(String),

    #[error("unexpected {0} packet")]
    UnexpectedPacket(&'static str),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("role violation: {0}")]
    RoleViolation(&'static str),

    #[error("no CONNECT within handshake timeout")]
    HandshakeTimeout,
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection refused by broker: {0:?}")]
    Rejected(ConnAckCode),

    #[error("Subscription failed: {0}")]
    Subscribe(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout waiting for response")]
    Timeout,
}

/// Broker lifecycle errors
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
