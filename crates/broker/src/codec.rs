//! Wire protocol: packet types and the length-prefixed frame codec
//!
//! ```text
//! ┌──────────────────┬─────────────────────────────┐
//! │ u32 BE body len  │ bincode-encoded Packet      │
//! └──────────────────┴─────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

pub const PROTOCOL_VERSION: u8 = 1;
pub const DEFAULT_MAX_FRAME: usize = 256 * 1024;

const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Publisher,
    Subscriber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnAckCode {
    Accepted,
    UnsupportedVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Connect {
        protocol_version: u8,
        role: Role,
        /// Seconds; 0 disables the keep-alive window
        keep_alive_secs: u16,
        client_id: String,
    },
    ConnAck {
        code: ConnAckCode,
        connection_id: Option<String>,
    },
    Subscribe {
        packet_id: u16,
        filters: Vec<String>,
    },
    SubAck {
        packet_id: u16,
    },
    Unsubscribe {
        packet_id: u16,
        filters: Vec<String>,
    },
    UnsubAck {
        packet_id: u16,
    },
    Publish {
        /// Set on retransmission of an unacknowledged message
        dup: bool,
        message_id: u64,
        topic: String,
        payload: Bytes,
    },
    PubAck {
        message_id: u64,
    },
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "CONNECT",
            Packet::ConnAck { .. } => "CONNACK",
            Packet::Subscribe { .. } => "SUBSCRIBE",
            Packet::SubAck { .. } => "SUBACK",
            Packet::Unsubscribe { .. } => "UNSUBSCRIBE",
            Packet::UnsubAck { .. } => "UNSUBACK",
            Packet::Publish { .. } => "PUBLISH",
            Packet::PubAck { .. } => "PUBACK",
            Packet::PingReq => "PINGREQ",
            Packet::PingResp => "PINGRESP",
            Packet::Disconnect => "DISCONNECT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame: usize,
}

impl FrameCodec {
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > self.max_frame {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame,
            });
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(len);
        bincode::deserialize(&body)
            .map(Some)
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let body = bincode::serialize(&packet).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        if body.len() > self.max_frame {
            return Err(ProtocolError::FrameTooLarge {
                len: body.len(),
                max: self.max_frame,
            });
        }
        dst.reserve(HEADER_LEN + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(packet: Packet) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::default().encode(packet, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_partial_frames_wait_for_more_bytes() {
        let full = encode(Packet::Publish {
            dup: false,
            message_id: 9,
            topic: "prices/update".into(),
            payload: Bytes::from_static(b"{\"kind\":\"update_available\"}"),
        });
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&full[..2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full[2..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full[10..]);

        match codec.decode(&mut buf).unwrap() {
            Some(Packet::Publish { message_id, topic, .. }) => {
                assert_eq!(message_id, 9);
                assert_eq!(topic, "prices/update");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut buf = encode(Packet::PingReq);
        buf.extend_from_slice(&encode(Packet::PubAck { message_id: 3 }));
        let mut codec = FrameCodec::default();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Packet::PingReq));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Packet::PubAck { message_id: 3 })
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_frame_rejected_before_buffering() {
        let mut buf = BytesMut::new();
        buf.put_u32(10 * 1024 * 1024);
        let err = FrameCodec::new(1024).decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { max: 1024, .. }));
    }

    #[test]
    fn test_garbage_body_is_decode_error() {
        let mut buf = BytesMut::new();
        buf.put_u32(4);
        buf.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        let err = FrameCodec::default().decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_encoder_enforces_limit() {
        let mut buf = BytesMut::new();
        let err = FrameCodec::new(16)
            .encode(
                Packet::Publish {
                    dup: false,
                    message_id: 1,
                    topic: "t".into(),
                    payload: Bytes::from(vec![0u8; 64]),
                },
                &mut buf,
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }
}
