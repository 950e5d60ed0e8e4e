// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FIX framing and the read-only incoming-message flyweight.

use super::{checksum, FixError, SOH, TAG_BODY_LENGTH, TAG_CHECKSUM, TAG_MSG_SEQ_NUM, TAG_MSG_TYPE};
use crate::codec::CodecError;

/// How many times `feed` will attempt to resynchronize on a corrupt
/// or malformed frame before giving up and reporting the buffer as
/// unrecoverable. Bounded rather than recursive so a hostile or
/// corrupted stream cannot blow the stack (spec REDESIGN FLAGS).
const MAX_RESYNC_ATTEMPTS: usize = 16;

/// Outcome of one `feed` call.
pub enum Frame<'a> {
    /// A complete, checksum-valid message was found.
    Message {
        message: IncomingFixMessage<'a>,
        /// Bytes consumed from the front of the input, including
        /// this message and any garbage skipped before it.
        consumed: usize,
    },
    /// No complete message yet; caller should read more bytes before
    /// calling `feed` again.
    NeedMoreData,
    /// A frame was found but rejected (bad checksum, malformed
    /// length, duplicate tag); `consumed` bytes should still be
    /// dropped so the reader does not loop on the same garbage.
    Invalid { consumed: usize, reason: FixError },
}

pub struct FixReader {
    max_message_size: usize,
}

impl FixReader {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Scans `data` for the next complete FIX message starting at or
    /// after offset 0. Never mutates `data`; the caller advances its
    /// own buffer by `consumed` bytes via `TcpChannel::consume`.
    pub fn feed<'a>(&self, data: &'a [u8]) -> Frame<'a> {
        let mut search_from = 0usize;
        for _ in 0..MAX_RESYNC_ATTEMPTS {
            let begin = match find_subslice(&data[search_from..], b"8=") {
                Some(rel) => search_from + rel,
                None => return Frame::NeedMoreData,
            };
            match self.try_frame_at(&data[begin..]) {
                Ok(FrameLen::Complete(len)) => match IncomingFixMessage::parse(&data[begin..begin + len]) {
                    Ok(message) => {
                        return Frame::Message {
                            message,
                            consumed: begin + len,
                        }
                    }
                    Err(reason) => {
                        search_from = begin + 1;
                        if search_from >= data.len() {
                            return Frame::Invalid { consumed: begin + 1, reason };
                        }
                        continue;
                    }
                },
                Ok(FrameLen::Incomplete) => return Frame::NeedMoreData,
                Err(reason) => {
                    search_from = begin + 1;
                    if search_from >= data.len() {
                        return Frame::Invalid { consumed: begin + 1, reason };
                    }
                    continue;
                }
            }
        }
        Frame::Invalid {
            consumed: search_from,
            reason: FixError::Codec(CodecError::MalformedLength { field: "resync_exhausted" }),
        }
    }

    fn try_frame_at(&self, data: &[u8]) -> Result<FrameLen, FixError> {
        debug_assert!(data.starts_with(b"8="));
        let begin_string_end = match find_byte(data, SOH) {
            Some(i) => i,
            None => return Ok(FrameLen::Incomplete),
        };
        let rest = &data[begin_string_end + 1..];
        if !rest.starts_with(b"9=") {
            return Err(CodecError::MissingTag { tag: TAG_BODY_LENGTH }.into());
        }
        let body_len_value_start = begin_string_end + 1 + 2;
        let body_len_end_rel = match find_byte(&data[body_len_value_start..], SOH) {
            Some(i) => i,
            None => return Ok(FrameLen::Incomplete),
        };
        let body_len_str = std::str::from_utf8(&data[body_len_value_start..body_len_value_start + body_len_end_rel])
            .map_err(|_| CodecError::MalformedLength { field: "BodyLength" })?;
        let body_len: usize = body_len_str
            .parse()
            .map_err(|_| CodecError::MalformedLength { field: "BodyLength" })?;
        if body_len > self.max_message_size {
            return Err(CodecError::BufferTooSmall {
                needed: body_len,
                capacity: self.max_message_size,
            }
            .into());
        }

        let body_start = body_len_value_start + body_len_end_rel + 1;
        let checksum_field_start = body_start + body_len;
        let total_len = checksum_field_start + 7; // "10=" + 3 digits + SOH
        if data.len() < total_len {
            return Ok(FrameLen::Incomplete);
        }
        let checksum_field = &data[checksum_field_start..total_len];
        if !checksum_field.starts_with(b"10=") || checksum_field[6] != SOH {
            return Err(CodecError::MissingTag { tag: TAG_CHECKSUM }.into());
        }
        let expected: u32 = std::str::from_utf8(&checksum_field[3..6])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::MalformedLength { field: "CheckSum" })?;
        let computed = checksum(&data[..checksum_field_start]) as u32;
        if expected != computed {
            return Err(CodecError::ChecksumMismatch { expected, computed }.into());
        }
        Ok(FrameLen::Complete(total_len))
    }
}

enum FrameLen {
    Complete(usize),
    Incomplete,
}

fn find_byte(data: &[u8], needle: u8) -> Option<usize> {
    data.iter().position(|&b| b == needle)
}

fn find_subslice(data: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || data.len() < needle.len() {
        return None;
    }
    data.windows(needle.len()).position(|w| w == needle)
}

/// Read-only, tag-indexed view over a complete, checksum-verified FIX
/// message. Never copies — every accessor returns a slice into the
/// original buffer the reactor handed the codec.
pub struct IncomingFixMessage<'a> {
    raw: &'a [u8],
    tags: Vec<(u32, u32, u32)>,
}

impl<'a> IncomingFixMessage<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<Self, FixError> {
        let mut tags = Vec::new();
        let mut offset = 0usize;
        while offset < raw.len() {
            let eq = find_byte(&raw[offset..], b'=')
                .ok_or(CodecError::MalformedLength { field: "tag" })?
                + offset;
            let tag: u32 = std::str::from_utf8(&raw[offset..eq])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(CodecError::MalformedLength { field: "tag" })?;
            let value_start = eq + 1;
            let soh_rel = find_byte(&raw[value_start..], SOH).ok_or(CodecError::MalformedLength { field: "value" })?;
            let value_len = soh_rel;
            if tags.iter().any(|&(t, _, _)| t == tag) {
                return Err(CodecError::DuplicateTag { tag }.into());
            }
            tags.push((tag, value_start as u32, value_len as u32));
            offset = value_start + value_len + 1;
        }
        Ok(Self { raw, tags })
    }

    pub fn get(&self, tag: u32) -> Option<&'a str> {
        self.tags.iter().find(|&&(t, _, _)| t == tag).map(|&(_, start, len)| {
            std::str::from_utf8(&self.raw[start as usize..(start + len) as usize]).unwrap_or_default()
        })
    }

    pub fn get_u64(&self, tag: u32) -> Option<u64> {
        self.get(tag).and_then(|s| s.parse().ok())
    }

    pub fn msg_type(&self) -> Option<&'a str> {
        self.get(TAG_MSG_TYPE)
    }

    pub fn msg_seq_num(&self) -> Option<u64> {
        self.get_u64(TAG_MSG_SEQ_NUM)
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Every `(tag, value)` pair in wire order, for callers that need
    /// to copy a message's body fields elsewhere (e.g. the engine's
    /// resend replay, which rebuilds a journaled message with
    /// `PossDupFlag`/`OrigSendingTime` added — see spec §4.7).
    pub fn fields(&self) -> impl Iterator<Item = (u32, &'a str)> + '_ {
        self.tags.iter().map(move |&(tag, start, len)| {
            (tag, std::str::from_utf8(&self.raw[start as usize..(start + len) as usize]).unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_message(msg_type: &str, seq: u64, extra: &str) -> Vec<u8> {
        let body = format!("35={msg_type}\x0149=SENDER\x0156=TARGET\x0134={seq}\x0152=20260726-00:00:00.000\x01{extra}");
        let header = format!("8=FIX.4.4\x019={}\x01", body.len());
        let without_checksum = format!("{header}{body}");
        let sum = checksum(without_checksum.as_bytes());
        format!("{without_checksum}10={sum:03}\x01").into_bytes()
    }

    #[test]
    fn feeds_single_complete_message() {
        let reader = FixReader::new(4096);
        let raw = build_message("D", 7, "");
        match reader.feed(&raw) {
            Frame::Message { message, consumed } => {
                assert_eq!(consumed, raw.len());
                assert_eq!(message.msg_type(), Some("D"));
                assert_eq!(message.msg_seq_num(), Some(7));
            }
            _ => panic!("expected a complete message"),
        }
    }

    #[test]
    fn incomplete_buffer_reports_need_more_data() {
        let reader = FixReader::new(4096);
        let raw = build_message("D", 1, "");
        match reader.feed(&raw[..raw.len() - 5]) {
            Frame::NeedMoreData => {}
            _ => panic!("expected NeedMoreData"),
        }
    }

    #[test]
    fn corrupted_checksum_resyncs_to_next_message() {
        let reader = FixReader::new(4096);
        let mut first = build_message("D", 1, "");
        let second = build_message("D", 2, "");
        // corrupt the first message's checksum field
        let len = first.len();
        first[len - 2] = b'9';
        let mut combined = first.clone();
        combined.extend_from_slice(&second);

        match reader.feed(&combined) {
            Frame::Message { message, consumed } => {
                assert_eq!(message.msg_seq_num(), Some(2));
                assert_eq!(consumed, combined.len());
            }
            Frame::NeedMoreData => panic!("expected recovery to the second message, got NeedMoreData"),
            Frame::Invalid { reason, .. } => panic!("expected recovery to the second message, got Invalid({reason})"),
        }
    }

    #[test]
    fn malformed_body_length_resyncs_to_next_message() {
        let reader = FixReader::new(4096);
        // "8=" immediately followed by something other than "9=" trips
        // the missing-BodyLength path rather than a checksum mismatch,
        // exercising a different resync trigger than the corrupted
        // checksum case above.
        let mut combined = b"8=FIX.4.4\x01NOTBODYLEN\x01".to_vec();
        let second = build_message("D", 2, "");
        combined.extend_from_slice(&second);

        match reader.feed(&combined) {
            Frame::Message { message, consumed } => {
                assert_eq!(message.msg_seq_num(), Some(2));
                assert_eq!(consumed, combined.len());
            }
            Frame::NeedMoreData => panic!("expected recovery to the second message, got NeedMoreData"),
            Frame::Invalid { reason, .. } => panic!("expected recovery to the second message, got Invalid({reason})"),
        }
    }

    #[test]
    fn duplicate_tag_is_rejected() {
        let raw = b"8=FIX.4.4\x019=10\x0135=0\x0135=0\x0110=000\x01".to_vec();
        let err = IncomingFixMessage::parse(&raw).unwrap_err();
        matches!(err, FixError::Codec(CodecError::DuplicateTag { tag: 35 }));
    }

    #[test]
    fn feeds_back_to_back_messages_one_call_at_a_time() {
        let reader = FixReader::new(4096);
        let first = build_message("0", 1, "");
        let second = build_message("0", 2, "");
        let mut combined = first.clone();
        combined.extend_from_slice(&second);

        let (consumed_first, seq_first) = match reader.feed(&combined) {
            Frame::Message { message, consumed } => (consumed, message.msg_seq_num().unwrap()),
            _ => panic!("expected first message"),
        };
        assert_eq!(consumed_first, first.len());
        assert_eq!(seq_first, 1);

        match reader.feed(&combined[consumed_first..]) {
            Frame::Message { message, consumed } => {
                assert_eq!(consumed, second.len());
                assert_eq!(message.msg_seq_num(), Some(2));
            }
            _ => panic!("expected second message"),
        }
    }
}
