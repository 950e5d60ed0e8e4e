// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FIX session state machine (C8, spec §4.7).
//!
//! A [`FixSession`] owns sequencing and admin-message bookkeeping; it
//! never touches the network or the ring buffer directly. Admin
//! messages (Logon, Logout, Heartbeat, TestRequest, ResendRequest,
//! Reject, SequenceReset) are built here because they are rare enough
//! that the small owned `Vec<u8>` they allocate does not matter.
//! Application traffic (NewOrderSingle, ExecutionReport, ...) is
//! relayed to the caller's callback and otherwise left untouched —
//! the hot path of claiming the outbound ring for that traffic
//! happens in the engine, not in this struct, so steady-state message
//! relay allocates nothing (spec §4 zero-allocation hot path).

use std::fmt;
use std::time::Duration;

use crate::codec::fix::reader::IncomingFixMessage;
use crate::codec::fix::writer::OutgoingFixMessage;
use crate::codec::fix::{
    admin, TAG_BEGIN_SEQ_NO, TAG_END_SEQ_NO, TAG_GAP_FILL_FLAG, TAG_NEW_SEQ_NO, TAG_POSS_DUP_FLAG,
    TAG_RESET_SEQ_NUM_FLAG, TAG_TEST_REQ_ID,
};
use crate::error::StateError;
use crate::time::{format_fix_sending_time, now_millis};

use super::{SessionAction, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixSessionState {
    Created,
    Connecting,
    Connected,
    LogonSent,
    LoggedOn,
    Resending,
    LogoutSent,
    Disconnected,
    Stopped,
}

impl FixSessionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::LogonSent => "LogonSent",
            Self::LoggedOn => "LoggedOn",
            Self::Resending => "Resending",
            Self::LogoutSent => "LogoutSent",
            Self::Disconnected => "Disconnected",
            Self::Stopped => "Stopped",
        }
    }

    pub fn validate_transition(self, to: Self) -> Result<(), StateError> {
        use FixSessionState::*;
        let legal = matches!(
            (self, to),
            (Created, Connecting)
                | (Connecting, Connected)
                | (Connected, LogonSent)
                | (Connected, LoggedOn) // acceptor: ack inbound Logon directly
                | (LogonSent, LoggedOn)
                | (LoggedOn, Resending)
                | (Resending, LoggedOn)
                | (LoggedOn, LogoutSent)
                | (Resending, LogoutSent)
                | (LogonSent, LogoutSent)
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
pub struct FixSessionConfig {
    pub begin_string: String,
    pub sender_comp_id: String,
    pub target_comp_id: String,
    pub heartbeat_interval: Duration,
    pub is_acceptor: bool,
}

/// Sequence-number bookkeeping and admin-message logic for one FIX
/// session leg. Recovery (loading `next_out_seq_num`/`next_in_seq_num`
/// from a prior run's journal) happens before construction — see
/// `engine::fix_from_journal` — so this type always starts from
/// caller-supplied, already-correct sequence numbers.
pub struct FixSession {
    config: FixSessionConfig,
    state: FixSessionState,
    next_out_seq_num: u64,
    next_in_seq_num: u64,
    last_received_at_ms: u64,
    resend_target: Option<u64>,
    msg_buf: [u8; 4096],
}

impl fmt::Debug for FixSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixSession")
            .field("state", &self.state)
            .field("next_out_seq_num", &self.next_out_seq_num)
            .field("next_in_seq_num", &self.next_in_seq_num)
            .finish()
    }
}

impl FixSession {
    pub fn new(config: FixSessionConfig, next_out_seq_num: u64, next_in_seq_num: u64) -> Self {
        Self {
            config,
            state: FixSessionState::Created,
            next_out_seq_num,
            next_in_seq_num,
            last_received_at_ms: 0,
            resend_target: None,
            msg_buf: [0u8; 4096],
        }
    }

    pub fn state(&self) -> FixSessionState {
        self.state
    }

    pub fn next_out_seq_num(&self) -> u64 {
        self.next_out_seq_num
    }

    pub fn next_in_seq_num(&self) -> u64 {
        self.next_in_seq_num
    }

    fn transition(&mut self, to: FixSessionState) -> Result<(), SessionError> {
        self.state.validate_transition(to)?;
        self.state = to;
        Ok(())
    }

    fn build(&mut self, msg_type: &str) -> Result<OutgoingFixMessage<'_>, SessionError> {
        let seq = self.next_out_seq_num;
        self.next_out_seq_num += 1;
        let sending_time = format_fix_sending_time(now_millis());
        Ok(OutgoingFixMessage::begin(
            &mut self.msg_buf,
            &self.config.begin_string,
            msg_type,
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
            seq,
            &sending_time,
        )?)
    }

    pub fn on_transport_connected(&mut self) -> Result<SessionAction, SessionError> {
        self.transition(FixSessionState::Connecting)?;
        self.transition(FixSessionState::Connected)?;
        if self.config.is_acceptor {
            // Wait for the initiator's Logon before responding.
            return Ok(SessionAction::None);
        }
        let len = self.build(admin::LOGON)?.finish()?;
        self.transition(FixSessionState::LogonSent)?;
        Ok(SessionAction::Send(self.msg_buf[..len].to_vec()))
    }

    pub fn request_logout(&mut self) -> Result<SessionAction, SessionError> {
        let len = self.build(admin::LOGOUT)?.finish()?;
        self.transition(FixSessionState::LogoutSent)?;
        Ok(SessionAction::Send(self.msg_buf[..len].to_vec()))
    }

    pub fn build_heartbeat(&mut self, test_req_id: Option<&str>) -> Result<Vec<u8>, SessionError> {
        let mut msg = self.build(admin::HEARTBEAT)?;
        if let Some(id) = test_req_id {
            msg.field(TAG_TEST_REQ_ID, id)?;
        }
        let len = msg.finish()?;
        Ok(self.msg_buf[..len].to_vec())
    }

    fn build_test_request(&mut self, test_req_id: &str) -> Result<Vec<u8>, SessionError> {
        let mut msg = self.build(admin::TEST_REQUEST)?;
        msg.field(TAG_TEST_REQ_ID, test_req_id)?;
        let len = msg.finish()?;
        Ok(self.msg_buf[..len].to_vec())
    }

    fn build_resend_request(&mut self, begin: u64, end: u64) -> Result<Vec<u8>, SessionError> {
        let mut msg = self.build(admin::RESEND_REQUEST)?;
        msg.field_u64(TAG_BEGIN_SEQ_NO, begin)?;
        msg.field_u64(TAG_END_SEQ_NO, end)?;
        let len = msg.finish()?;
        Ok(self.msg_buf[..len].to_vec())
    }

    /// Builds a SequenceReset-GapFill (MsgType=4, GapFillFlag=Y)
    /// answering a ResendRequest: `seq_num` is the first sequence
    /// number of the admin-only run being bridged (the gap fill's own
    /// MsgSeqNum, since it occupies that historical slot rather than
    /// a fresh one) and `new_seq_no` is the sequence the peer should
    /// expect next, closing the gap without re-sending the admin-only
    /// messages that originally held it (spec §4.7 ResendRequest
    /// handling). Does not consume `next_out_seq_num`, matching
    /// `build_replay`.
    pub fn build_gap_fill_at(&mut self, seq_num: u64, new_seq_no: u64) -> Result<Vec<u8>, SessionError> {
        let mut cursor_buf = std::mem::take(&mut self.msg_buf);
        let result = (|| -> Result<usize, SessionError> {
            let sending_time = format_fix_sending_time(now_millis());
            let mut msg = OutgoingFixMessage::begin(
                &mut cursor_buf,
                &self.config.begin_string,
                admin::SEQUENCE_RESET,
                &self.config.sender_comp_id,
                &self.config.target_comp_id,
                seq_num,
                &sending_time,
            )?;
            msg.field(TAG_GAP_FILL_FLAG, "Y")?;
            msg.field_u64(TAG_NEW_SEQ_NO, new_seq_no)?;
            Ok(msg.finish()?)
        })();
        self.msg_buf = cursor_buf;
        let len = result?;
        Ok(self.msg_buf[..len].to_vec())
    }

    /// Re-encodes a previously sent message, read back from the
    /// journal, as a poss-dup replay: same BeginString/CompIDs/MsgType
    /// and the *original* MsgSeqNum and SendingTime, plus
    /// `PossDupFlag=Y` and `OrigSendingTime` set to that original
    /// SendingTime (spec §4.7 ResendRequest handling, Testable
    /// Property 7). `body_fields` carries every tag beyond the
    /// standard header that the original message held, copied
    /// verbatim. Does not consume a slot from `next_out_seq_num` since
    /// the sequence number itself is historical.
    pub fn build_replay(
        &mut self,
        msg_type: &str,
        orig_seq_num: u64,
        orig_sending_time: &[u8; 21],
        body_fields: &[(u32, &[u8])],
    ) -> Result<Vec<u8>, SessionError> {
        let mut cursor_buf = std::mem::take(&mut self.msg_buf);
        let result = (|| -> Result<usize, SessionError> {
            let mut msg = OutgoingFixMessage::begin(
                &mut cursor_buf,
                &self.config.begin_string,
                msg_type,
                &self.config.sender_comp_id,
                &self.config.target_comp_id,
                orig_seq_num,
                orig_sending_time,
            )?;
            msg.poss_dup()?;
            msg.orig_sending_time(orig_sending_time)?;
            for (tag, value) in body_fields {
                msg.field_bytes(*tag, value)?;
            }
            Ok(msg.finish()?)
        })();
        self.msg_buf = cursor_buf;
        let len = result?;
        Ok(self.msg_buf[..len].to_vec())
    }

    /// Encodes and sequences one outbound application message (spec
    /// §6 `send-application-message`). `body_fields` are appended
    /// verbatim after the standard header; the caller is responsible
    /// for supplying fields appropriate to `msg_type` since this
    /// session does not carry a data dictionary (spec §2 Non-goals).
    pub fn build_application(
        &mut self,
        msg_type: &str,
        body_fields: &[(u32, &[u8])],
    ) -> Result<Vec<u8>, SessionError> {
        if self.state != FixSessionState::LoggedOn {
            return Err(SessionError::State(StateError { attempted: "send-application-message", current: self.state.name() }));
        }
        let mut msg = self.build(msg_type)?;
        for (tag, value) in body_fields {
            msg.field_bytes(*tag, value)?;
        }
        let len = msg.finish()?;
        Ok(self.msg_buf[..len].to_vec())
    }

    /// Periodic tick, driven by the engine's timer wheel. Emits a
    /// heartbeat if the heartbeat interval has elapsed and no other
    /// traffic has been sent (the engine tracks last-sent-time itself
    /// and only calls this when due) or a TestRequest if the peer has
    /// gone quiet for more than the heartbeat interval.
    pub fn on_heartbeat_due(&mut self) -> Result<SessionAction, SessionError> {
        if self.state != FixSessionState::LoggedOn {
            return Ok(SessionAction::None);
        }
        Ok(SessionAction::Send(self.build_heartbeat(None)?))
    }

    pub fn on_peer_silent(&mut self, now_ms: u64) -> Result<SessionAction, SessionError> {
        if self.state != FixSessionState::LoggedOn {
            return Ok(SessionAction::None);
        }
        let elapsed = now_ms.saturating_sub(self.last_received_at_ms);
        if elapsed as u128 > self.config.heartbeat_interval.as_millis() {
            return Ok(SessionAction::Send(self.build_test_request("TEST1")?));
        }
        Ok(SessionAction::None)
    }

    /// Forces an immediate TestRequest, independent of the
    /// peer-silence timer (spec §6 `send-test-request`).
    pub fn force_test_request(&mut self, test_req_id: &str) -> Result<SessionAction, SessionError> {
        if self.state != FixSessionState::LoggedOn {
            return Ok(SessionAction::None);
        }
        Ok(SessionAction::Send(self.build_test_request(test_req_id)?))
    }

    /// Processes one decoded incoming message, updating sequence
    /// state and returning whatever reaction the engine must carry
    /// out. `on_application` is invoked for any message this session
    /// does not interpret itself (spec §2 Non-goals: no business
    /// logic beyond sequencing/session bookkeeping).
    pub fn handle_incoming<F: FnMut(&IncomingFixMessage)>(
        &mut self,
        msg: &IncomingFixMessage,
        now_ms: u64,
        mut on_application: F,
    ) -> Result<SessionAction, SessionError> {
        self.last_received_at_ms = now_ms;
        let seq = msg.msg_seq_num().ok_or(SessionError::Protocol("missing MsgSeqNum"))?;
        let poss_dup = msg.get(TAG_POSS_DUP_FLAG) == Some("Y");
        let msg_type = msg.msg_type().ok_or(SessionError::Protocol("missing MsgType"))?;

        if msg_type == admin::SEQUENCE_RESET {
            return self.handle_sequence_reset(msg);
        }

        // ResetSeqNumFlag=Y on a Logon resets both sequence numbers to 1
        // before the usual gap/duplicate checks run, regardless of
        // what this leg currently expects (spec §4.7).
        if msg_type == admin::LOGON && msg.get(TAG_RESET_SEQ_NUM_FLAG) == Some("Y") {
            self.next_out_seq_num = 1;
            self.next_in_seq_num = 2;
            return self.handle_logon();
        }

        if seq < self.next_in_seq_num {
            if poss_dup {
                return Ok(SessionAction::None);
            }
            // A MsgSeqNum below what we expect, without PossDupFlag, is
            // fatal (spec §4.7, §7 `SequenceError::TooLow`): send a
            // Logout before disconnecting rather than dropping silently.
            let len = self.build(admin::LOGOUT)?.finish()?;
            self.transition(FixSessionState::Disconnected)?;
            return Ok(SessionAction::SendAndDisconnect(self.msg_buf[..len].to_vec()));
        }

        if seq > self.next_in_seq_num {
            if self.state == FixSessionState::Resending {
                return Ok(SessionAction::None);
            }
            self.resend_target = Some(seq - 1);
            self.transition(FixSessionState::Resending)?;
            let req = self.build_resend_request(self.next_in_seq_num, 0)?;
            return Ok(SessionAction::Send(req));
        }

        self.next_in_seq_num += 1;
        if self.state == FixSessionState::Resending {
            if Some(self.next_in_seq_num - 1) >= self.resend_target {
                self.resend_target = None;
                self.transition(FixSessionState::LoggedOn)?;
            }
        }

        match msg_type {
            t if t == admin::LOGON => self.handle_logon(),
            t if t == admin::LOGOUT => self.handle_logout(),
            t if t == admin::HEARTBEAT => Ok(SessionAction::None),
            t if t == admin::TEST_REQUEST => {
                let id = msg.get(TAG_TEST_REQ_ID).unwrap_or("").to_string();
                Ok(SessionAction::Send(self.build_heartbeat(Some(&id))?))
            }
            t if t == admin::RESEND_REQUEST => {
                let begin = msg.get_u64(TAG_BEGIN_SEQ_NO).unwrap_or(1);
                let end = msg.get_u64(TAG_END_SEQ_NO).unwrap_or(0);
                Ok(SessionAction::ResendRequested { begin_seq_num: begin, end_seq_num: end })
            }
            t if t == admin::REJECT => Ok(SessionAction::None),
            _ => {
                on_application(msg);
                Ok(SessionAction::None)
            }
        }
    }

    fn handle_logon(&mut self) -> Result<SessionAction, SessionError> {
        match self.state {
            FixSessionState::Connected => {
                let len = self.build(admin::LOGON)?.finish()?;
                self.transition(FixSessionState::LoggedOn)?;
                Ok(SessionAction::Send(self.msg_buf[..len].to_vec()))
            }
            FixSessionState::LogonSent => {
                self.transition(FixSessionState::LoggedOn)?;
                Ok(SessionAction::None)
            }
            _ => Err(SessionError::Protocol("unexpected Logon")),
        }
    }

    fn handle_logout(&mut self) -> Result<SessionAction, SessionError> {
        if self.state == FixSessionState::LogoutSent {
            self.transition(FixSessionState::Disconnected)?;
            return Ok(SessionAction::Disconnect);
        }
        let len = self.build(admin::LOGOUT)?.finish()?;
        self.transition(FixSessionState::Disconnected)?;
        Ok(SessionAction::SendMany(vec![self.msg_buf[..len].to_vec()]))
    }

    fn handle_sequence_reset(&mut self, msg: &IncomingFixMessage) -> Result<SessionAction, SessionError> {
        let new_seq_no = msg.get_u64(TAG_NEW_SEQ_NO).ok_or(SessionError::Protocol("missing NewSeqNo"))?;
        let gap_fill = msg.get(TAG_GAP_FILL_FLAG) == Some("Y");
        if gap_fill && new_seq_no < self.next_in_seq_num {
            return Err(SessionError::Protocol("SequenceReset-GapFill may not decrease NewSeqNo"));
        }
        self.next_in_seq_num = new_seq_no;
        if self.state == FixSessionState::Resending {
            if Some(new_seq_no.saturating_sub(1)) >= self.resend_target {
                self.resend_target = None;
                self.transition(FixSessionState::LoggedOn)?;
            }
        }
        Ok(SessionAction::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fix::{checksum, TAG_MSG_SEQ_NUM};

    fn config(is_acceptor: bool) -> FixSessionConfig {
        FixSessionConfig {
            begin_string: "FIX.4.4".to_string(),
            sender_comp_id: "US".to_string(),
            target_comp_id: "THEM".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            is_acceptor,
        }
    }

    fn encode_admin(msg_type: &str, seq: u64, extra: &[(u32, &str)]) -> Vec<u8> {
        let mut extra_fields = String::new();
        for (tag, val) in extra {
            extra_fields.push_str(&format!("{tag}={val}\x01"));
        }
        let body = format!("35={msg_type}\x0149=THEM\x0156=US\x0134={seq}\x0152=20260726-00:00:00.000\x01{extra_fields}");
        let header = format!("8=FIX.4.4\x019={}\x01", body.len());
        let without_checksum = format!("{header}{body}");
        let sum = checksum(without_checksum.as_bytes());
        format!("{without_checksum}10={sum:03}\x01").into_bytes()
    }

    #[test]
    fn initiator_sends_logon_on_connect() {
        let mut session = FixSession::new(config(false), 1, 1);
        let action = session.on_transport_connected().unwrap();
        assert_eq!(session.state(), FixSessionState::LogonSent);
        match action {
            SessionAction::Send(bytes) => assert!(IncomingFixMessage::parse(&bytes).unwrap().msg_type() == Some("A")),
            _ => panic!("expected Send"),
        }
    }

    #[test]
    fn acceptor_waits_then_acks_inbound_logon() {
        let mut session = FixSession::new(config(true), 1, 1);
        session.on_transport_connected().unwrap();
        assert_eq!(session.state(), FixSessionState::Connected);

        let raw = encode_admin("A", 1, &[]);
        let msg = IncomingFixMessage::parse(&raw).unwrap();
        let action = session.handle_incoming(&msg, 1000, |_| {}).unwrap();
        assert_eq!(session.state(), FixSessionState::LoggedOn);
        assert!(matches!(action, SessionAction::Send(_)));
    }

    #[test]
    fn gap_triggers_resend_request_and_resending_state() {
        let mut session = FixSession::new(config(false), 1, 1);
        session.on_transport_connected().unwrap();
        let logon_ack = encode_admin("A", 1, &[]);
        session
            .handle_incoming(&IncomingFixMessage::parse(&logon_ack).unwrap(), 1000, |_| {})
            .unwrap();
        assert_eq!(session.state(), FixSessionState::LoggedOn);

        let gapped = encode_admin("0", 5, &[]);
        let action = session
            .handle_incoming(&IncomingFixMessage::parse(&gapped).unwrap(), 2000, |_| {})
            .unwrap();
        assert_eq!(session.state(), FixSessionState::Resending);
        match action {
            SessionAction::Send(bytes) => {
                let resend = IncomingFixMessage::parse(&bytes).unwrap();
                assert_eq!(resend.msg_type(), Some("2"));
                assert_eq!(resend.get(TAG_MSG_SEQ_NUM).is_some(), true);
            }
            _ => panic!("expected a ResendRequest"),
        }
    }

    #[test]
    fn gap_fill_sequence_reset_closes_resend_window() {
        let mut session = FixSession::new(config(false), 1, 1);
        session.on_transport_connected().unwrap();
        session
            .handle_incoming(&IncomingFixMessage::parse(&encode_admin("A", 1, &[])).unwrap(), 0, |_| {})
            .unwrap();

        session
            .handle_incoming(&IncomingFixMessage::parse(&encode_admin("0", 5, &[])).unwrap(), 0, |_| {})
            .unwrap();
        assert_eq!(session.state(), FixSessionState::Resending);

        let gap_fill = encode_admin("4", 2, &[(123, "Y"), (36, "5")]);
        session
            .handle_incoming(&IncomingFixMessage::parse(&gap_fill).unwrap(), 0, |_| {})
            .unwrap();
        assert_eq!(session.state(), FixSessionState::LoggedOn);
        assert_eq!(session.next_in_seq_num(), 5);
    }

    #[test]
    fn duplicate_below_expected_without_possdup_sends_logout_then_disconnects() {
        let mut session = FixSession::new(config(false), 1, 5);
        let raw = encode_admin("0", 2, &[]);
        let action = session
            .handle_incoming(&IncomingFixMessage::parse(&raw).unwrap(), 0, |_| {})
            .unwrap();
        match action {
            SessionAction::SendAndDisconnect(bytes) => {
                let logout = IncomingFixMessage::parse(&bytes).unwrap();
                assert_eq!(logout.msg_type(), Some(admin::LOGOUT));
            }
            _ => panic!("expected SendAndDisconnect carrying a Logout"),
        }
        assert_eq!(session.state(), FixSessionState::Disconnected);
    }

    #[test]
    fn application_message_is_forwarded_not_interpreted() {
        let mut session = FixSession::new(config(false), 1, 1);
        session.on_transport_connected().unwrap();
        session
            .handle_incoming(&IncomingFixMessage::parse(&encode_admin("A", 1, &[])).unwrap(), 0, |_| {})
            .unwrap();

        let raw = encode_admin("D", 2, &[]);
        let mut seen = false;
        session
            .handle_incoming(&IncomingFixMessage::parse(&raw).unwrap(), 0, |m| {
                seen = m.msg_type() == Some("D");
            })
            .unwrap();
        assert!(seen);
        assert_eq!(session.next_in_seq_num(), 3);
    }
}
