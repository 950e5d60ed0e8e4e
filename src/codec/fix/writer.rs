// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pooled, pre-laid-out outgoing FIX message encoder.

use super::{checksum, FixError, SOH};
use crate::buf::CursorMut;
use crate::codec::CodecError;

/// Width reserved for the `BodyLength` field. Fixed so the value can
/// be patched in place after the body is written instead of shifting
/// every already-written byte to make room for a variable-width
/// integer (spec §4.1 patch-placeholder pattern).
const BODY_LENGTH_WIDTH: usize = 6;

/// Builds one outgoing FIX message directly into a caller-owned,
/// reusable buffer. Call [`Self::begin`], any number of field
/// appenders, then [`Self::finish`] to patch `BodyLength` and append
/// the trailing `CheckSum` field.
pub struct OutgoingFixMessage<'a> {
    cursor: CursorMut<'a>,
    body_length_patch_at: usize,
    body_start: usize,
}

impl<'a> OutgoingFixMessage<'a> {
    pub fn begin(
        buf: &'a mut [u8],
        begin_string: &str,
        msg_type: &str,
        sender_comp_id: &str,
        target_comp_id: &str,
        msg_seq_num: u64,
        sending_time: &[u8; 21],
    ) -> Result<Self, FixError> {
        let mut cursor = CursorMut::new(buf);
        cursor.append_ascii("8=").map_err(map_buf_err)?;
        cursor.append_ascii(begin_string).map_err(map_buf_err)?;
        cursor.append_u8(SOH).map_err(map_buf_err)?;
        cursor.append_ascii("9=").map_err(map_buf_err)?;
        let body_length_patch_at = cursor.offset();
        cursor
            .append_digits_zero_padded(0, BODY_LENGTH_WIDTH)
            .map_err(map_buf_err)?;
        cursor.append_u8(SOH).map_err(map_buf_err)?;
        let body_start = cursor.offset();

        let mut msg = Self {
            cursor,
            body_length_patch_at,
            body_start,
        };
        msg.field(super::TAG_MSG_TYPE, msg_type)?;
        msg.field(super::TAG_SENDER_COMP_ID, sender_comp_id)?;
        msg.field(super::TAG_TARGET_COMP_ID, target_comp_id)?;
        msg.field_u64(super::TAG_MSG_SEQ_NUM, msg_seq_num)?;
        msg.field_bytes(super::TAG_SENDING_TIME, sending_time)?;
        Ok(msg)
    }

    pub fn field(&mut self, tag: u32, value: &str) -> Result<(), FixError> {
        self.field_bytes(tag, value.as_bytes())
    }

    pub fn field_u64(&mut self, tag: u32, value: u64) -> Result<(), FixError> {
        self.cursor.append_digits(tag as u64).map_err(map_buf_err)?;
        self.cursor.append_u8(b'=').map_err(map_buf_err)?;
        self.cursor.append_digits(value).map_err(map_buf_err)?;
        self.cursor.append_u8(SOH).map_err(map_buf_err)?;
        Ok(())
    }

    pub fn field_bytes(&mut self, tag: u32, value: &[u8]) -> Result<(), FixError> {
        self.cursor.append_digits(tag as u64).map_err(map_buf_err)?;
        self.cursor.append_u8(b'=').map_err(map_buf_err)?;
        self.cursor.append_bytes(value).map_err(map_buf_err)?;
        self.cursor.append_u8(SOH).map_err(map_buf_err)?;
        Ok(())
    }

    pub fn poss_dup(&mut self) -> Result<(), FixError> {
        self.field(super::TAG_POSS_DUP_FLAG, "Y")
    }

    /// Sets `OrigSendingTime` (tag 122) to the timestamp the message
    /// originally carried. Used together with [`Self::poss_dup`] when
    /// replaying a journaled message in response to a ResendRequest
    /// (spec §4.7, Testable Property 7).
    pub fn orig_sending_time(&mut self, value: &[u8; 21]) -> Result<(), FixError> {
        self.field_bytes(super::TAG_ORIG_SENDING_TIME, value)
    }

    /// Patches `BodyLength`, appends the `CheckSum` trailer, and
    /// returns the total number of bytes written — ready to hand to
    /// the outbound ring or socket directly.
    pub fn finish(mut self) -> Result<usize, FixError> {
        let body_length = self.cursor.offset() - self.body_start;
        if body_length >= 10usize.pow(BODY_LENGTH_WIDTH as u32) {
            return Err(CodecError::MalformedLength { field: "BodyLength" }.into());
        }
        let end_offset = self.cursor.offset();
        self.cursor.seek(self.body_length_patch_at).map_err(map_buf_err)?;
        self.cursor
            .append_digits_zero_padded(body_length as u64, BODY_LENGTH_WIDTH)
            .map_err(map_buf_err)?;
        self.cursor.seek(end_offset).map_err(map_buf_err)?;

        let sum = checksum(self.cursor.written());
        self.cursor.append_ascii("10=").map_err(map_buf_err)?;
        self.cursor
            .append_digits_zero_padded(sum as u64, 3)
            .map_err(map_buf_err)?;
        self.cursor.append_u8(SOH).map_err(map_buf_err)?;
        Ok(self.cursor.offset())
    }
}

fn map_buf_err(e: crate::buf::BufError) -> FixError {
    FixError::Codec(CodecError::BufferTooSmall {
        needed: e.offset + e.len,
        capacity: e.capacity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fix::reader::IncomingFixMessage;
    use crate::time::format_fix_sending_time;

    #[test]
    fn builds_parseable_heartbeat() {
        let mut buf = [0u8; 256];
        let sending_time = format_fix_sending_time(1_767_322_845_000);
        let mut msg = OutgoingFixMessage::begin(&mut buf, "FIX.4.4", "0", "SENDER", "TARGET", 42, &sending_time).unwrap();
        let len = msg.finish().unwrap();

        let parsed = IncomingFixMessage::parse(&buf[..len]).unwrap();
        assert_eq!(parsed.msg_type(), Some("0"));
        assert_eq!(parsed.msg_seq_num(), Some(42));
        assert_eq!(parsed.get(super::super::TAG_SENDER_COMP_ID), Some("SENDER"));
    }

    #[test]
    fn poss_dup_flag_round_trips() {
        let mut buf = [0u8; 256];
        let sending_time = format_fix_sending_time(0);
        let mut msg = OutgoingFixMessage::begin(&mut buf, "FIX.4.4", "1", "A", "B", 1, &sending_time).unwrap();
        msg.poss_dup().unwrap();
        let len = msg.finish().unwrap();
        let parsed = IncomingFixMessage::parse(&buf[..len]).unwrap();
        assert_eq!(parsed.get(super::super::TAG_POSS_DUP_FLAG), Some("Y"));
    }

    #[test]
    fn buffer_reused_across_messages_without_realloc() {
        let mut buf = [0u8; 256];
        let sending_time = format_fix_sending_time(0);
        for seq in 1..=3u64 {
            let msg = OutgoingFixMessage::begin(&mut buf, "FIX.4.4", "0", "S", "T", seq, &sending_time).unwrap();
            let len = msg.finish().unwrap();
            let parsed = IncomingFixMessage::parse(&buf[..len]).unwrap();
            assert_eq!(parsed.msg_seq_num(), Some(seq));
        }
    }
}
