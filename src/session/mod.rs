// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session state machines (C8 FIX, C9 OUCH; spec §4.7, §4.8).

pub mod fix;
pub mod ouch;

use std::fmt;

use crate::codec::fix::FixError;
use crate::codec::ouch::OuchError;
use crate::error::{SequenceError, StateError};
use crate::journal::JournalError;

#[derive(Debug)]
pub enum SessionError {
    State(StateError),
    Sequence(SequenceError),
    Fix(FixError),
    Ouch(OuchError),
    Journal(JournalError),
    Protocol(&'static str),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(e) => write!(f, "{e}"),
            Self::Sequence(e) => write!(f, "{e}"),
            Self::Fix(e) => write!(f, "{e}"),
            Self::Ouch(e) => write!(f, "{e}"),
            Self::Journal(e) => write!(f, "{e}"),
            Self::Protocol(reason) => write!(f, "protocol violation: {reason}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StateError> for SessionError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

impl From<SequenceError> for SessionError {
    fn from(e: SequenceError) -> Self {
        Self::Sequence(e)
    }
}

impl From<FixError> for SessionError {
    fn from(e: FixError) -> Self {
        Self::Fix(e)
    }
}

impl From<OuchError> for SessionError {
    fn from(e: OuchError) -> Self {
        Self::Ouch(e)
    }
}

impl From<JournalError> for SessionError {
    fn from(e: JournalError) -> Self {
        Self::Journal(e)
    }
}

/// What a session wants done in reaction to an incoming message or a
/// timer tick. The engine is responsible for actually moving bytes
/// (claiming the outbound ring, replaying journaled records for a
/// resend) — sessions only decide *what* should happen.
#[derive(Debug)]
pub enum SessionAction {
    None,
    Send(Vec<u8>),
    SendMany(Vec<Vec<u8>>),
    /// The peer asked for a replay of `begin_seq_num..=end_seq_num`
    /// (`end_seq_num == 0` means "through the current end"). The
    /// engine resolves this against the journal (spec §4.9) since the
    /// session itself holds no message history.
    ResendRequested { begin_seq_num: u64, end_seq_num: u64 },
    Disconnect,
    /// Send this message (a Logout) and then disconnect once it is on
    /// the wire — a fatal sequence error (spec §4.7, §7 `SequenceError::TooLow`)
    /// must still give the peer a Logout rather than dropping silently.
    SendAndDisconnect(Vec<u8>),
}
