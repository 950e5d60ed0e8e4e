// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OUCH session state machine (C9, spec §4.8).
//!
//! Simpler than the FIX leg: SoupBinTCP has no gap-fill/resend
//! protocol of its own — a dropped connection recovers by logging
//! back in with the last sequence number the client processed
//! (`RequestedSequenceNumber`) and letting the server replay
//! sequenced data from there. There is nothing for this session to
//! negotiate mid-stream the way FIX's ResendRequest does.

use std::fmt;
use std::time::Duration;

use crate::codec::ouch::envelope::{PacketType, SoupBinFrame, SoupBinReader};
use crate::codec::CodecError;
use crate::error::StateError;

use super::{SessionAction, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuchSessionState {
    Created,
    Connecting,
    Connected,
    LoginSent,
    LoggedIn,
    LogoutSent,
    Disconnected,
    Stopped,
}

impl OuchSessionState {
    fn name(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::LoginSent => "LoginSent",
            Self::LoggedIn => "LoggedIn",
            Self::LogoutSent => "LogoutSent",
            Self::Disconnected => "Disconnected",
            Self::Stopped => "Stopped",
        }
    }

    pub fn validate_transition(self, to: Self) -> Result<(), StateError> {
        use OuchSessionState::*;
        let legal = matches!(
            (self, to),
            (Created, Connecting)
                | (Connecting, Connected)
                | (Connected, LoginSent)
                | (LoginSent, LoggedIn)
                | (LoggedIn, LogoutSent)
                | (_, Disconnected)
                | (_, Stopped)
        );
        if legal {
            Ok(())
        } else {
            Err(StateError { attempted: to.name(), current: self.name() })
        }
    }
}

#[derive(Debug, Clone)]
pub struct OuchSessionConfig {
    pub username: String,
    pub password: String,
    pub requested_session: String,
    pub heartbeat_interval: Duration,
}

/// Fixed widths of the SoupBinTCP login request payload fields.
const USERNAME_LEN: usize = 6;
const PASSWORD_LEN: usize = 10;
const SESSION_LEN: usize = 10;
const SEQ_NUM_LEN: usize = 20;

pub struct OuchSession {
    config: OuchSessionConfig,
    state: OuchSessionState,
    /// Sequence number of the next sequenced-data packet this session
    /// expects from the server; persisted via the journal so restart
    /// can resume with the correct `RequestedSequenceNumber`.
    next_in_seq_num: u64,
    last_received_at_ms: u64,
}

impl fmt::Debug for OuchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OuchSession")
            .field("state", &self.state)
            .field("next_in_seq_num", &self.next_in_seq_num)
            .finish()
    }
}

impl OuchSession {
    pub fn new(config: OuchSessionConfig, next_in_seq_num: u64) -> Self {
        Self {
            config,
            state: OuchSessionState::Created,
            next_in_seq_num,
            last_received_at_ms: 0,
        }
    }

    pub fn state(&self) -> OuchSessionState {
        self.state
    }

    pub fn next_in_seq_num(&self) -> u64 {
        self.next_in_seq_num
    }

    fn transition(&mut self, to: OuchSessionState) -> Result<(), SessionError> {
        self.state.validate_transition(to)?;
        self.state = to;
        Ok(())
    }

    fn fixed_ascii(value: &str, width: usize) -> Vec<u8> {
        let mut out = vec![b' '; width];
        let bytes = value.as_bytes();
        let n = bytes.len().min(width);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }

    pub fn on_transport_connected(&mut self) -> Result<SessionAction, SessionError> {
        self.transition(OuchSessionState::Connecting)?;
        self.transition(OuchSessionState::Connected)?;

        let mut payload = Vec::with_capacity(USERNAME_LEN + PASSWORD_LEN + SESSION_LEN + SEQ_NUM_LEN);
        payload.extend(Self::fixed_ascii(&self.config.username, USERNAME_LEN));
        payload.extend(Self::fixed_ascii(&self.config.password, PASSWORD_LEN));
        payload.extend(Self::fixed_ascii(&self.config.requested_session, SESSION_LEN));
        payload.extend(Self::fixed_ascii(&self.next_in_seq_num.to_string(), SEQ_NUM_LEN));

        let mut buf = vec![0u8; 2 + 1 + payload.len()];
        let len = SoupBinReader::encode(&mut buf, PacketType::LoginRequest, &payload)
            .map_err(|e| SessionError::Ouch(e.into()))?;
        buf.truncate(len);
        self.transition(OuchSessionState::LoginSent)?;
        Ok(SessionAction::Send(buf))
    }

    pub fn build_client_heartbeat(&self) -> Result<Vec<u8>, SessionError> {
        let mut buf = [0u8; 3];
        let len = SoupBinReader::encode(&mut buf, PacketType::ClientHeartbeat, &[])
            .map_err(|e| SessionError::Ouch(e.into()))?;
        Ok(buf[..len].to_vec())
    }

    pub fn request_logout(&mut self) -> Result<SessionAction, SessionError> {
        let mut buf = [0u8; 3];
        let len = SoupBinReader::encode(&mut buf, PacketType::LogoutRequest, &[])
            .map_err(|e| SessionError::Ouch(e.into()))?;
        self.transition(OuchSessionState::LogoutSent)?;
        Ok(SessionAction::Send(buf[..len].to_vec()))
    }

    pub fn on_peer_silent(&mut self, now_ms: u64) -> Result<SessionAction, SessionError> {
        if self.state != OuchSessionState::LoggedIn {
            return Ok(SessionAction::None);
        }
        let elapsed = now_ms.saturating_sub(self.last_received_at_ms);
        if elapsed as u128 > self.config.heartbeat_interval.as_millis() {
            return Ok(SessionAction::Send(self.build_client_heartbeat()?));
        }
        Ok(SessionAction::None)
    }

    /// Processes one SoupBinTCP frame already separated from its
    /// envelope by [`SoupBinReader::feed`]. `on_sequenced_data` is
    /// invoked with the OUCH message payload for every sequenced-data
    /// packet (spec §2 Non-goals: payload content is not interpreted
    /// here beyond the fixed-width accessors in `codec::ouch::messages`).
    pub fn handle_incoming<F: FnMut(&[u8])>(
        &mut self,
        frame: &SoupBinFrame<'_>,
        now_ms: u64,
        mut on_sequenced_data: F,
    ) -> Result<SessionAction, SessionError> {
        self.last_received_at_ms = now_ms;
        let packet_type = PacketType::from_byte(frame.packet_type)
            .ok_or(SessionError::Ouch(CodecError::MalformedLength { field: "packet_type" }.into()))?;

        match packet_type {
            PacketType::LoginAccepted => {
                if self.state != OuchSessionState::LoginSent {
                    return Err(SessionError::Protocol("unexpected LoginAccepted"));
                }
                self.transition(OuchSessionState::LoggedIn)?;
                Ok(SessionAction::None)
            }
            PacketType::LoginRejected => {
                self.transition(OuchSessionState::Disconnected)?;
                Ok(SessionAction::Disconnect)
            }
            PacketType::SequencedData => {
                on_sequenced_data(frame.payload);
                self.next_in_seq_num += 1;
                Ok(SessionAction::None)
            }
            PacketType::UnsequencedData => {
                on_sequenced_data(frame.payload);
                Ok(SessionAction::None)
            }
            PacketType::ServerHeartbeat => Ok(SessionAction::None),
            PacketType::EndOfSession => {
                self.transition(OuchSessionState::Disconnected)?;
                Ok(SessionAction::Disconnect)
            }
            PacketType::Debug => Ok(SessionAction::None),
            PacketType::ClientHeartbeat | PacketType::LoginRequest | PacketType::LogoutRequest => {
                Err(SessionError::Protocol("client-originated packet type received from server"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OuchSessionConfig {
        OuchSessionConfig {
            username: "abc".to_string(),
            password: "secret".to_string(),
            requested_session: "".to_string(),
            heartbeat_interval: Duration::from_secs(1),
        }
    }

    fn frame(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 3 + payload.len()];
        let len = SoupBinReader::encode(&mut buf, packet_type, payload).unwrap();
        buf.truncate(len);
        buf
    }

    #[test]
    fn login_then_accept_transitions_to_logged_in() {
        let mut session = OuchSession::new(config(), 1);
        let action = session.on_transport_connected().unwrap();
        assert_eq!(session.state(), OuchSessionState::LoginSent);
        assert!(matches!(action, SessionAction::Send(_)));

        let raw = frame(PacketType::LoginAccepted, b"");
        let parsed = match SoupBinReader::feed(&raw).unwrap() {
            crate::codec::ouch::envelope::SoupBinFeed::Frame { frame, .. } => frame,
            _ => panic!("expected frame"),
        };
        session.handle_incoming(&parsed, 0, |_| {}).unwrap();
        assert_eq!(session.state(), OuchSessionState::LoggedIn);
    }

    #[test]
    fn login_rejected_disconnects() {
        let mut session = OuchSession::new(config(), 1);
        session.on_transport_connected().unwrap();
        let raw = frame(PacketType::LoginRejected, b"C");
        let parsed = match SoupBinReader::feed(&raw).unwrap() {
            crate::codec::ouch::envelope::SoupBinFeed::Frame { frame, .. } => frame,
            _ => panic!("expected frame"),
        };
        let action = session.handle_incoming(&parsed, 0, |_| {}).unwrap();
        assert!(matches!(action, SessionAction::Disconnect));
    }

    #[test]
    fn sequenced_data_advances_counter_and_forwards_payload() {
        let mut session = OuchSession::new(config(), 5);
        session.on_transport_connected().unwrap();
        let raw = frame(PacketType::LoginAccepted, b"");
        let parsed = match SoupBinReader::feed(&raw).unwrap() {
            crate::codec::ouch::envelope::SoupBinFeed::Frame { frame, .. } => frame,
            _ => panic!("expected frame"),
        };
        session.handle_incoming(&parsed, 0, |_| {}).unwrap();

        let data = frame(PacketType::SequencedData, b"Ahello-accepted-report");
        let parsed = match SoupBinReader::feed(&data).unwrap() {
            crate::codec::ouch::envelope::SoupBinFeed::Frame { frame, .. } => frame,
            _ => panic!("expected frame"),
        };
        let mut seen = Vec::new();
        session.handle_incoming(&parsed, 0, |payload| seen = payload.to_vec()).unwrap();
        assert_eq!(session.next_in_seq_num(), 6);
        assert_eq!(seen, b"Ahello-accepted-report");
    }
}
