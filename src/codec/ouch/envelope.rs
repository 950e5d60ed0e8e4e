// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SoupBinTCP transport envelope (spec §4.6): every OUCH packet, in
//! either direction, is wrapped as `length: u16 BE | packet_type: u8
//! | payload[length - 1]`.

use crate::buf::{ByteBuf, ByteBufMut};
use crate::codec::CodecError;

const ENVELOPE_PREFIX_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SequencedData,
    UnsequencedData,
    ServerHeartbeat,
    ClientHeartbeat,
    LoginAccepted,
    LoginRejected,
    LoginRequest,
    LogoutRequest,
    EndOfSession,
    Debug,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            b'S' => Self::SequencedData,
            b'U' => Self::UnsequencedData,
            b'R' => Self::ServerHeartbeat,
            b'H' => Self::ClientHeartbeat,
            b'A' => Self::LoginAccepted,
            b'J' => Self::LoginRejected,
            b'L' => Self::LoginRequest,
            b'O' => Self::LogoutRequest,
            b'Z' => Self::EndOfSession,
            b'+' => Self::Debug,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::SequencedData => b'S',
            Self::UnsequencedData => b'U',
            Self::ServerHeartbeat => b'R',
            Self::ClientHeartbeat => b'H',
            Self::LoginAccepted => b'A',
            Self::LoginRejected => b'J',
            Self::LoginRequest => b'L',
            Self::LogoutRequest => b'O',
            Self::EndOfSession => b'Z',
            Self::Debug => b'+',
        }
    }
}

/// One decoded SoupBinTCP frame: its packet type plus a view over the
/// payload bytes that follow (not including the 2-byte length prefix
/// or the 1-byte packet type).
pub struct SoupBinFrame<'a> {
    pub packet_type: u8,
    pub payload: &'a [u8],
}

/// Stateless framer: `feed` is pure with respect to its input slice,
/// matching the FIX reader's contract so both codecs plug into the
/// same session-layer drive loop.
pub struct SoupBinReader;

pub enum SoupBinFeed<'a> {
    Frame { frame: SoupBinFrame<'a>, consumed: usize },
    NeedMoreData,
}

impl SoupBinReader {
    pub fn feed<'a>(data: &'a [u8]) -> Result<SoupBinFeed<'a>, CodecError> {
        if data.len() < ENVELOPE_PREFIX_LEN {
            return Ok(SoupBinFeed::NeedMoreData);
        }
        let view = ByteBuf::new(data);
        let body_len = view.get_u16_be(0)? as usize;
        if body_len == 0 {
            return Err(CodecError::MalformedLength { field: "soupbin.length" });
        }
        let total = ENVELOPE_PREFIX_LEN + body_len;
        if data.len() < total {
            return Ok(SoupBinFeed::NeedMoreData);
        }
        let packet_type = data[ENVELOPE_PREFIX_LEN];
        let payload = &data[ENVELOPE_PREFIX_LEN + 1..total];
        Ok(SoupBinFeed::Frame {
            frame: SoupBinFrame { packet_type, payload },
            consumed: total,
        })
    }

    /// Encodes `payload` into `buf`, prefixed with the SoupBinTCP
    /// length/packet-type header. Returns the total bytes written.
    pub fn encode(buf: &mut [u8], packet_type: PacketType, payload: &[u8]) -> Result<usize, CodecError> {
        let body_len = 1 + payload.len();
        let total = ENVELOPE_PREFIX_LEN + body_len;
        if buf.len() < total {
            return Err(CodecError::BufferTooSmall { needed: total, capacity: buf.len() });
        }
        let mut view = ByteBufMut::new(buf);
        view.put_u16_be(0, body_len as u16)?;
        view.put_u8(ENVELOPE_PREFIX_LEN, packet_type.to_byte())?;
        view.put_slice(ENVELOPE_PREFIX_LEN + 1, payload)?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_feed_recovers_payload() {
        let mut buf = [0u8; 64];
        let len = SoupBinReader::encode(&mut buf, PacketType::SequencedData, b"hello-ouch").unwrap();
        match SoupBinReader::feed(&buf[..len]).unwrap() {
            SoupBinFeed::Frame { frame, consumed } => {
                assert_eq!(consumed, len);
                assert_eq!(frame.packet_type, b'S');
                assert_eq!(frame.payload, b"hello-ouch");
            }
            SoupBinFeed::NeedMoreData => panic!("expected a frame"),
        }
    }

    #[test]
    fn partial_header_needs_more_data() {
        let buf = [0u8];
        assert!(matches!(SoupBinReader::feed(&buf).unwrap(), SoupBinFeed::NeedMoreData));
    }

    #[test]
    fn partial_body_needs_more_data() {
        let mut buf = [0u8; 64];
        let len = SoupBinReader::encode(&mut buf, PacketType::ClientHeartbeat, b"abc").unwrap();
        assert!(matches!(
            SoupBinReader::feed(&buf[..len - 1]).unwrap(),
            SoupBinFeed::NeedMoreData
        ));
    }

    #[test]
    fn packet_type_roundtrips_known_values() {
        for &b in &[b'S', b'U', b'H', b'R', b'A', b'J', b'L', b'O', b'Z'] {
            let pt = PacketType::from_byte(b).unwrap();
            assert_eq!(pt.to_byte(), b);
        }
        assert!(PacketType::from_byte(b'?').is_none());
    }
}
