// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FIX tag=value codec (C6, spec §4.5).
//!
//! The framer ([`reader::FixReader`]) and the two flyweight message
//! types ([`reader::IncomingFixMessage`], [`writer::OutgoingFixMessage`])
//! are kept separate on purpose: an incoming message is a read-only
//! index over someone else's bytes (the channel's read buffer), while
//! an outgoing message owns a pooled, pre-laid-out buffer it writes
//! into directly. Sharing one type with a "present" bit, as an
//! earlier draft of this module did, made the common case (send a
//! NewOrderSingle) pay for machinery only the uncommon case (decode
//! an arbitrary incoming admin message) needed.

pub mod reader;
pub mod writer;

pub use reader::{FixReader, IncomingFixMessage};
pub use writer::OutgoingFixMessage;

use std::fmt;

use crate::codec::CodecError;

pub const SOH: u8 = 0x01;

/// Standard tags this crate understands directly; application body
/// fields beyond these are carried opaquely (spec §4.5: OmniBridge
/// does not validate business-level content).
pub const TAG_BEGIN_STRING: u32 = 8;
pub const TAG_BODY_LENGTH: u32 = 9;
pub const TAG_MSG_TYPE: u32 = 35;
pub const TAG_SENDER_COMP_ID: u32 = 49;
pub const TAG_TARGET_COMP_ID: u32 = 56;
pub const TAG_MSG_SEQ_NUM: u32 = 34;
pub const TAG_SENDING_TIME: u32 = 52;
pub const TAG_POSS_DUP_FLAG: u32 = 43;
pub const TAG_POSS_RESEND: u32 = 97;
pub const TAG_ORIG_SENDING_TIME: u32 = 122;
pub const TAG_CHECKSUM: u32 = 10;
pub const TAG_TEST_REQ_ID: u32 = 112;
pub const TAG_TEXT: u32 = 58;
pub const TAG_GAP_FILL_FLAG: u32 = 123;
pub const TAG_NEW_SEQ_NO: u32 = 36;
pub const TAG_BEGIN_SEQ_NO: u32 = 7;
pub const TAG_END_SEQ_NO: u32 = 16;
pub const TAG_REF_SEQ_NUM: u32 = 45;
pub const TAG_REF_TAG_ID: u32 = 371;
pub const TAG_REF_MSG_TYPE: u32 = 372;
pub const TAG_SESSION_REJECT_REASON: u32 = 373;
pub const TAG_ENCRYPT_METHOD: u32 = 98;
pub const TAG_HEART_BT_INT: u32 = 108;
pub const TAG_RESET_SEQ_NUM_FLAG: u32 = 141;

/// Admin message types OmniBridge's session layer interprets
/// directly (spec §4.5).
pub mod admin {
    pub const LOGON: &str = "A";
    pub const LOGOUT: &str = "5";
    pub const HEARTBEAT: &str = "0";
    pub const TEST_REQUEST: &str = "1";
    pub const RESEND_REQUEST: &str = "2";
    pub const REJECT: &str = "3";
    pub const SEQUENCE_RESET: &str = "4";
}

/// Application message types round-tripped as opaque body content —
/// OmniBridge sequences and journals these but does not interpret
/// the business fields (spec §2 Non-goals: no order book, no
/// matching logic).
pub mod application {
    pub const NEW_ORDER_SINGLE: &str = "D";
    pub const EXECUTION_REPORT: &str = "8";
    pub const ORDER_CANCEL_REQUEST: &str = "F";
    pub const ORDER_CANCEL_REJECT: &str = "9";
    pub const ORDER_CANCEL_REPLACE_REQUEST: &str = "G";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixError {
    Codec(CodecError),
    InvalidBeginString,
}

impl fmt::Display for FixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "{e}"),
            Self::InvalidBeginString => write!(f, "invalid or missing BeginString"),
        }
    }
}

impl std::error::Error for FixError {}

impl From<CodecError> for FixError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// FIX's mod-256 checksum: the sum of every byte in the message up to
/// and including the SOH immediately before the `10=` field, modulo
/// 256 (spec §4.5).
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_known_value() {
        // "8=FIX.4.2\x019=5\x0135=0\x01" — hand-summed reference value.
        let msg = b"8=FIX.4.2\x019=5\x0135=0\x01";
        let sum: u32 = msg.iter().map(|&b| b as u32).sum();
        assert_eq!(checksum(msg) as u32, sum % 256);
    }
}
