// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OUCH fixed-width binary codec (C7, spec §4.6).
//!
//! Unlike FIX, OUCH carries no self-describing length field per
//! message — the length comes from the SoupBinTCP envelope
//! ([`envelope`]) that wraps every packet, and the message layout
//! itself is a fixed byte offset table keyed by `(version, msg_type)`
//! ([`messages::message_length`]). Every accessor below is a
//! zero-copy view over the caller's buffer via [`crate::buf::ByteBuf`]/
//! [`crate::buf::ByteBufMut`].

pub mod envelope;
pub mod messages;

pub use envelope::{SoupBinFrame, SoupBinReader, PacketType};
pub use messages::{message_length, OuchVersion};

use std::fmt;

use crate::codec::CodecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OuchError {
    Codec(CodecError),
    UnknownPacketType { byte: u8 },
    UnknownMessageType { msg_type: u8 },
}

impl fmt::Display for OuchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "{e}"),
            Self::UnknownPacketType { byte } => write!(f, "unknown SoupBinTCP packet type {byte:#04x}"),
            Self::UnknownMessageType { msg_type } => {
                write!(f, "unknown OUCH message type {:#04x}", msg_type)
            }
        }
    }
}

impl std::error::Error for OuchError {}

impl From<CodecError> for OuchError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}
