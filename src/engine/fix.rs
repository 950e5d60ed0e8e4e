// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection FIX wiring: frames bytes off the wire, drives the
//! session state machine, journals every inbound/outbound message, and
//! answers ResendRequests against the journal (spec §4.7, §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::codec::fix::reader::Frame;
use crate::codec::fix::{
    admin, FixReader, IncomingFixMessage, TAG_BEGIN_STRING, TAG_BODY_LENGTH, TAG_CHECKSUM,
    TAG_MSG_SEQ_NUM, TAG_MSG_TYPE, TAG_ORIG_SENDING_TIME, TAG_POSS_DUP_FLAG, TAG_SENDER_COMP_ID,
    TAG_SENDING_TIME, TAG_TARGET_COMP_ID,
};
use crate::error::{EngineError, SequenceError, SequenceErrorKind};
use crate::journal::{Direction, JournalRecord, JournalTailer, JournalWriter};
use crate::ring::Ring;
use crate::session::fix::{FixSession, FixSessionConfig, FixSessionState};
use crate::session::{SessionAction, SessionError};
use crate::transport::tcp::NetworkConfig;

use super::{ConnectionStats, EngineListener, MessageDirection};

/// 30s: how long a leg waits for Logon to complete before giving up on
/// a freshly opened transport (spec §7).
const LOGON_TIMEOUT_MS: u64 = 30_000;
/// Heartbeat-interval multipliers for the TestRequest and disconnect
/// tiers (spec §4.7): 1.2x silence asks the peer to prove it is alive,
/// 2.4x with no answer gives up on it.
const TEST_REQUEST_MULTIPLIER: u64 = 12;
const DISCONNECT_MULTIPLIER: u64 = 24;

pub(crate) struct OnDataResult {
    pub consumed: usize,
    pub disconnect: bool,
}

fn is_admin_msg_type(msg_type: &str) -> bool {
    msg_type == admin::LOGON
        || msg_type == admin::LOGOUT
        || msg_type == admin::HEARTBEAT
        || msg_type == admin::TEST_REQUEST
        || msg_type == admin::RESEND_REQUEST
        || msg_type == admin::REJECT
        || msg_type == admin::SEQUENCE_RESET
}

/// Header tags already carried by [`crate::codec::fix::writer::OutgoingFixMessage::begin`]
/// or set explicitly by [`FixSession::build_replay`] — skipped when
/// copying a journaled message's remaining body fields during replay.
const REPLAY_SKIP_TAGS: &[u32] = &[
    TAG_BEGIN_STRING,
    TAG_BODY_LENGTH,
    TAG_MSG_TYPE,
    TAG_SENDER_COMP_ID,
    TAG_TARGET_COMP_ID,
    TAG_MSG_SEQ_NUM,
    TAG_SENDING_TIME,
    TAG_CHECKSUM,
    TAG_POSS_DUP_FLAG,
    TAG_ORIG_SENDING_TIME,
];

pub struct FixConnection {
    name: String,
    network: NetworkConfig,
    fix_config: FixSessionConfig,
    session: FixSession,
    reader: FixReader,
    journal: JournalWriter,
    outbound: Option<Arc<Ring>>,
    last_sent_at_ms: u64,
    last_received_at_ms: u64,
    test_request_pending_since_ms: Option<u64>,
    connected_at_ms: u64,
    connected: bool,
    enabled: bool,
    reconnect_at_ms: Option<u64>,
    reconnect_attempts_used: u32,
    stats: ConnectionStats,
    stats_handle: Arc<ArcSwap<ConnectionStats>>,
    listener: Option<Arc<dyn EngineListener + Send + Sync>>,
    last_reported_state: &'static str,
}

impl FixConnection {
    pub fn new(
        name: String,
        network: NetworkConfig,
        fix_config: FixSessionConfig,
        next_out_seq_num: u64,
        next_in_seq_num: u64,
        journal: JournalWriter,
    ) -> Self {
        let session = FixSession::new(fix_config.clone(), next_out_seq_num, next_in_seq_num);
        let max_message_size = network.max_message_size;
        Self {
            name,
            network,
            fix_config,
            session,
            reader: FixReader::new(max_message_size),
            journal,
            outbound: None,
            last_sent_at_ms: 0,
            last_received_at_ms: 0,
            test_request_pending_since_ms: None,
            connected_at_ms: 0,
            connected: false,
            enabled: true,
            reconnect_at_ms: None,
            reconnect_attempts_used: 0,
            stats: ConnectionStats::default(),
            stats_handle: Arc::new(ArcSwap::from_pointee(ConnectionStats::default())),
            listener: None,
            last_reported_state: "Created",
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_listener(&mut self, listener: Arc<dyn EngineListener + Send + Sync>) {
        self.listener = Some(listener);
    }

    pub fn stats_handle(&self) -> Arc<ArcSwap<ConnectionStats>> {
        self.stats_handle.clone()
    }

    fn publish_stats(&self) {
        self.stats_handle.store(Arc::new(self.stats.clone()));
    }

    fn note_error(&mut self, reason: impl Into<String>) {
        self.stats.last_error = Some(reason.into());
    }

    fn report_state(&mut self) {
        let current = self.session.state().name();
        if current != self.last_reported_state {
            self.last_reported_state = current;
            log::info!("fix[{}]: state -> {current}", self.name);
            if let Some(listener) = &self.listener {
                listener.on_state_change(&self.name, current);
            }
        }
    }

    pub fn on_connected(&mut self, outbound: Arc<Ring>, now_ms: u64) {
        self.outbound = Some(outbound);
        self.connected = true;
        self.connected_at_ms = now_ms;
        self.reconnect_at_ms = None;
        self.reconnect_attempts_used = 0;
        match self.session.on_transport_connected() {
            Ok(action) => self.apply_action(action, now_ms),
            Err(e) => self.note_error(e.to_string()),
        }
        self.report_state();
        self.publish_stats();
    }

    pub fn on_connect_failed(&mut self, now_ms: u64) {
        self.connected = false;
        self.note_error("connect failed");
        self.schedule_reconnect(now_ms);
        self.publish_stats();
    }

    pub fn on_disconnected(&mut self, now_ms: u64) {
        self.connected = false;
        self.outbound = None;
        self.test_request_pending_since_ms = None;
        self.schedule_reconnect(now_ms);
        self.report_state();
        self.publish_stats();
    }

    fn schedule_reconnect(&mut self, now_ms: u64) {
        if self.network.role != crate::transport::tcp::ConnectionRole::Initiator {
            return;
        }
        if let Some(max) = self.network.max_reconnect_attempts {
            if self.reconnect_attempts_used >= max {
                return;
            }
        }
        self.reconnect_attempts_used += 1;
        self.reconnect_at_ms = Some(now_ms + self.network.reconnect_delay.as_millis() as u64);
    }

    pub fn reconnect_due(&mut self, now_ms: u64) -> bool {
        if self.connected {
            return false;
        }
        match self.reconnect_at_ms {
            Some(at) if now_ms >= at => {
                self.reconnect_at_ms = None;
                true
            }
            _ => false,
        }
    }

    fn send_raw(&mut self, bytes: &[u8]) {
        let Some(ring) = self.outbound.clone() else {
            self.note_error("no outbound ring (not connected)");
            return;
        };
        match ring.try_claim(bytes.len()) {
            Ok(claim) => {
                ring.write_at(claim).copy_from_slice(bytes);
                ring.commit(claim, 1);
            }
            Err(e) => {
                log::warn!("fix[{}]: outbound ring full, dropping message: {e}", self.name);
                self.note_error(e.to_string());
            }
        }
    }

    fn send_tracked(&mut self, bytes: &[u8], now_ms: u64) {
        self.send_raw(bytes);
        self.last_sent_at_ms = now_ms;
        self.stats.messages_sent += 1;
        if let Some(listener) = &self.listener {
            listener.on_message(&self.name, MessageDirection::Outbound, bytes);
        }
        if let Ok(parsed) = IncomingFixMessage::parse(bytes) {
            let seq = parsed.msg_seq_num().unwrap_or(0) as u32;
            self.journal_record(seq, Direction::Outbound, bytes, now_ms);
        }
    }

    fn journal_record(&mut self, seq: u32, direction: Direction, raw: &[u8], now_ms: u64) {
        let record = JournalRecord {
            timestamp_epoch_ms: now_ms,
            sequence_number: seq,
            direction,
            metadata: Vec::new(),
            payload: raw.to_vec(),
        };
        if let Err(e) = self.journal.append(&record) {
            log::error!("fix[{}]: journal append failed: {e}", self.name);
            self.note_error(e.to_string());
        }
    }

    fn apply_action(&mut self, action: SessionAction, now_ms: u64) -> bool {
        match action {
            SessionAction::None => false,
            SessionAction::Send(bytes) => {
                self.send_tracked(&bytes, now_ms);
                false
            }
            SessionAction::SendMany(msgs) => {
                for bytes in msgs {
                    self.send_tracked(&bytes, now_ms);
                }
                false
            }
            SessionAction::ResendRequested { begin_seq_num, end_seq_num } => {
                self.perform_resend(begin_seq_num, end_seq_num, now_ms);
                false
            }
            SessionAction::Disconnect => true,
            SessionAction::SendAndDisconnect(bytes) => {
                self.note_error(SequenceError { kind: SequenceErrorKind::TooLow }.to_string());
                self.send_tracked(&bytes, now_ms);
                true
            }
        }
    }

    pub(crate) fn on_data(&mut self, data: &[u8], now_ms: u64) -> OnDataResult {
        match self.reader.feed(data) {
            Frame::Message { message, consumed } => {
                self.last_received_at_ms = now_ms;
                self.test_request_pending_since_ms = None;
                self.stats.messages_received += 1;
                let seq = message.msg_seq_num().unwrap_or(0) as u32;
                self.journal_record(seq, Direction::Inbound, message.raw(), now_ms);
                if let Some(listener) = &self.listener {
                    listener.on_message(&self.name, MessageDirection::Inbound, message.raw());
                }

                let name = self.name.clone();
                let listener = self.listener.clone();
                let expected_seq = self.session.next_in_seq_num();
                let was_resending = self.session.state() == FixSessionState::Resending;
                let result = self.session.handle_incoming(&message, now_ms, |app_msg| {
                    if let Some(listener) = &listener {
                        listener.on_message(&name, MessageDirection::Inbound, app_msg.raw());
                    }
                });
                let disconnect = match result {
                    Ok(action) => {
                        if !was_resending && self.session.state() == FixSessionState::Resending {
                            self.note_error(
                                SequenceError {
                                    kind: SequenceErrorKind::GapDetected { expected: expected_seq, actual: seq as u64 },
                                }
                                .to_string(),
                            );
                        }
                        self.apply_action(action, now_ms)
                    }
                    Err(e) => {
                        log::warn!("fix[{}]: session error: {e}", self.name);
                        self.note_error(e.to_string());
                        matches!(e, SessionError::Protocol(_))
                    }
                };
                self.report_state();
                self.publish_stats();
                OnDataResult { consumed, disconnect }
            }
            Frame::NeedMoreData => OnDataResult { consumed: 0, disconnect: false },
            Frame::Invalid { consumed, reason } => {
                self.stats.reject_count += 1;
                self.note_error(reason.to_string());
                log::warn!("fix[{}]: rejected malformed frame: {reason}", self.name);
                self.publish_stats();
                OnDataResult { consumed, disconnect: false }
            }
        }
    }

    /// Answers a ResendRequest by walking the journal's outbound
    /// records between `begin_seq_num` and the effective end (spec
    /// §4.7, §4.9): application messages are replayed verbatim with
    /// `PossDupFlag`; runs of admin-only or missing sequence numbers
    /// are bridged with a single SequenceReset-GapFill each.
    fn perform_resend(&mut self, begin_seq_num: u64, end_seq_num: u64, now_ms: u64) {
        let effective_end = if end_seq_num == 0 {
            self.session.next_out_seq_num().saturating_sub(1)
        } else {
            end_seq_num
        };
        if effective_end < begin_seq_num {
            return;
        }

        let mut by_seq: HashMap<u32, JournalRecord> = HashMap::new();
        match JournalTailer::open(self.journal.path()) {
            Ok(mut tailer) => loop {
                match tailer.next_record() {
                    Ok(Some(rec)) => {
                        if rec.direction == Direction::Outbound
                            && (rec.sequence_number as u64) >= begin_seq_num
                            && (rec.sequence_number as u64) <= effective_end
                        {
                            by_seq.insert(rec.sequence_number, rec);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.note_error(e.to_string());
                        break;
                    }
                }
            },
            Err(e) => {
                self.note_error(e.to_string());
                return;
            }
        }

        let mut gap_start: Option<u64> = None;
        for seq in begin_seq_num..=effective_end {
            let application = by_seq
                .get(&(seq as u32))
                .and_then(|rec| IncomingFixMessage::parse(&rec.payload).ok().map(|m| (rec, m)))
                .filter(|(_, parsed)| !is_admin_msg_type(parsed.msg_type().unwrap_or("")));

            match application {
                Some((_rec, parsed)) => {
                    if let Some(start) = gap_start.take() {
                        self.send_gap_fill(start, seq, now_ms);
                    }
                    self.replay_one(&parsed, now_ms);
                }
                None => {
                    gap_start.get_or_insert(seq);
                }
            }
        }
        if let Some(start) = gap_start {
            self.send_gap_fill(start, effective_end + 1, now_ms);
        }
    }

    /// Sends a SequenceReset-GapFill whose own MsgSeqNum is `seq_num`
    /// (the first sequence number of the run it bridges) rather than
    /// a freshly assigned one; journaled like any other new outbound
    /// traffic since, unlike a replay, this exact message was never
    /// sent before.
    fn send_gap_fill(&mut self, seq_num: u64, new_seq_no: u64, now_ms: u64) {
        match self.session.build_gap_fill_at(seq_num, new_seq_no) {
            Ok(bytes) => self.send_tracked(&bytes, now_ms),
            Err(e) => {
                log::error!("fix[{}]: failed to build gap fill: {e}", self.name);
                self.note_error(e.to_string());
            }
        }
    }

    fn replay_one(&mut self, parsed: &IncomingFixMessage<'_>, now_ms: u64) {
        let msg_type = parsed.msg_type().unwrap_or_default().to_string();
        let orig_seq_num = parsed.msg_seq_num().unwrap_or(0);
        let sending_time = parsed.get(TAG_SENDING_TIME).unwrap_or("");
        let mut orig_sending_time = [b' '; 21];
        let bytes = sending_time.as_bytes();
        let n = bytes.len().min(21);
        orig_sending_time[..n].copy_from_slice(&bytes[..n]);

        let body_fields: Vec<(u32, &[u8])> = parsed
            .fields()
            .filter(|(tag, _)| !REPLAY_SKIP_TAGS.contains(tag))
            .map(|(tag, value)| (tag, value.as_bytes()))
            .collect();

        match self.session.build_replay(&msg_type, orig_seq_num, &orig_sending_time, &body_fields) {
            // Historical resend: the sequence number already lives in
            // the journal, so this does not go through `send_tracked`.
            Ok(bytes) => self.send_raw(&bytes),
            Err(e) => {
                log::error!("fix[{}]: failed to build replay for seq {orig_seq_num}: {e}", self.name);
                self.note_error(e.to_string());
            }
        }
    }

    /// Heartbeat tiering and the 30s logon timeout (spec §4.7, §7).
    /// Returns `true` if the caller should close this connection.
    pub(crate) fn on_tick(&mut self, now_ms: u64) -> bool {
        if !self.connected {
            return false;
        }
        let state = self.session.state();
        if state != FixSessionState::LoggedOn
            && state != FixSessionState::Disconnected
            && state != FixSessionState::Stopped
            && now_ms.saturating_sub(self.connected_at_ms) > LOGON_TIMEOUT_MS
        {
            log::warn!("fix[{}]: logon timed out after {LOGON_TIMEOUT_MS}ms", self.name);
            self.note_error("logon timeout");
            self.publish_stats();
            return true;
        }

        if state != FixSessionState::LoggedOn {
            self.publish_stats();
            return false;
        }

        let interval_ms = self.fix_config.heartbeat_interval.as_millis() as u64;
        if interval_ms > 0 && now_ms.saturating_sub(self.last_sent_at_ms) >= interval_ms {
            match self.session.on_heartbeat_due() {
                Ok(action) => {
                    let _ = self.apply_action(action, now_ms);
                }
                Err(e) => self.note_error(e.to_string()),
            }
        }

        let silence_ms = now_ms.saturating_sub(self.last_received_at_ms);
        let test_threshold = interval_ms.saturating_mul(TEST_REQUEST_MULTIPLIER) / 10;
        let disconnect_threshold = interval_ms.saturating_mul(DISCONNECT_MULTIPLIER) / 10;

        if silence_ms > disconnect_threshold && self.test_request_pending_since_ms.is_some() {
            log::warn!("fix[{}]: no response to TestRequest, disconnecting", self.name);
            self.note_error("heartbeat timeout");
            self.publish_stats();
            return true;
        }
        if silence_ms > test_threshold && self.test_request_pending_since_ms.is_none() {
            match self.session.on_peer_silent(now_ms) {
                Ok(SessionAction::Send(bytes)) => {
                    self.send_tracked(&bytes, now_ms);
                    self.test_request_pending_since_ms = Some(now_ms);
                }
                Ok(_) => {}
                Err(e) => self.note_error(e.to_string()),
            }
        }
        self.publish_stats();
        false
    }

    pub fn set_outgoing_seq_num(&mut self, n: u64) -> Result<(), EngineError> {
        self.session = FixSession::new(self.fix_config.clone(), n, self.session.next_in_seq_num());
        Ok(())
    }

    pub fn set_incoming_seq_num(&mut self, n: u64) -> Result<(), EngineError> {
        self.session = FixSession::new(self.fix_config.clone(), self.session.next_out_seq_num(), n);
        Ok(())
    }

    pub fn reset_sequences(&mut self) -> Result<(), EngineError> {
        self.session = FixSession::new(self.fix_config.clone(), 1, 1);
        Ok(())
    }

    pub fn send_test_request(&mut self, now_ms: u64) -> Result<(), EngineError> {
        match self.session.force_test_request("TEST-EXPLICIT") {
            Ok(SessionAction::Send(bytes)) => {
                self.send_tracked(&bytes, now_ms);
                self.test_request_pending_since_ms = Some(now_ms);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(session_error_to_engine(e)),
        }
    }

    pub fn send_application(&mut self, msg_type: &str, fields: &[(u32, &[u8])], now_ms: u64) -> Result<(), EngineError> {
        match self.session.build_application(msg_type, fields) {
            Ok(bytes) => {
                self.send_tracked(&bytes, now_ms);
                Ok(())
            }
            Err(e) => Err(session_error_to_engine(e)),
        }
    }
}

fn session_error_to_engine(e: SessionError) -> EngineError {
    match e {
        SessionError::State(s) => EngineError::State(s),
        SessionError::Sequence(s) => EngineError::Sequence(s),
        SessionError::Journal(j) => EngineError::Journal(j),
        other => EngineError::Config(crate::error::ConfigError { field: "session", reason: other.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fix::checksum;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn fix_config() -> FixSessionConfig {
        FixSessionConfig {
            begin_string: "FIX.4.4".to_string(),
            sender_comp_id: "US".to_string(),
            target_comp_id: "THEM".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            is_acceptor: false,
        }
    }

    fn network_config() -> NetworkConfig {
        NetworkConfig::initiator("127.0.0.1:0".parse::<SocketAddr>().unwrap())
    }

    fn new_journal(dir: &tempfile::TempDir) -> JournalWriter {
        JournalWriter::create(dir.path().join("fix.log"), false, "fix").unwrap()
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

    /// Drains every committed record currently in `ring` as parsed FIX
    /// messages, in ring order.
    fn drain_fix(ring: &Ring) -> Vec<Vec<u8>> {
        let mut seen = Vec::new();
        ring.read(|_type_id, payload| seen.push(payload.to_vec()));
        seen
    }

    #[test]
    fn initiator_sends_logon_and_journals_it() {
        let dir = tempfile::tempdir().unwrap();
        let journal = new_journal(&dir);
        let mut conn = FixConnection::new("leg1".to_string(), network_config(), fix_config(), 1, 1, journal);
        let ring = Arc::new(Ring::with_capacity(4096));

        conn.on_connected(ring.clone(), 1_000);

        let sent = drain_fix(&ring);
        assert_eq!(sent.len(), 1);
        let logon = IncomingFixMessage::parse(&sent[0]).unwrap();
        assert_eq!(logon.msg_type(), Some(admin::LOGON));
        assert_eq!(logon.msg_seq_num(), Some(1));
        assert_eq!(conn.stats_handle().load().messages_sent, 1);
    }

    #[test]
    fn on_tick_emits_heartbeat_after_interval_elapsed() {
        let dir = tempfile::tempdir().unwrap();
        let journal = new_journal(&dir);
        let mut config = fix_config();
        config.heartbeat_interval = Duration::from_secs(1);
        let mut conn = FixConnection::new("leg1".to_string(), network_config(), config, 1, 1, journal);
        let ring = Arc::new(Ring::with_capacity(4096));
        conn.on_connected(ring.clone(), 0);
        drain_fix(&ring); // consume the Logon

        let logon_ack = encode_admin(admin::LOGON, 1, &[]);
        let disconnect = conn.on_data(&logon_ack, 10);
        assert!(!disconnect.disconnect);
        drain_fix(&ring); // no reply expected, but clear the ring

        assert!(!conn.on_tick(500));
        assert!(drain_fix(&ring).is_empty());

        assert!(!conn.on_tick(1_200));
        let sent = drain_fix(&ring);
        assert_eq!(sent.len(), 1);
        assert_eq!(IncomingFixMessage::parse(&sent[0]).unwrap().msg_type(), Some(admin::HEARTBEAT));
    }

    #[test]
    fn logon_timeout_triggers_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let journal = new_journal(&dir);
        let mut conn = FixConnection::new("leg1".to_string(), network_config(), fix_config(), 1, 1, journal);
        let ring = Arc::new(Ring::with_capacity(4096));
        conn.on_connected(ring.clone(), 0);
        drain_fix(&ring);

        assert!(!conn.on_tick(LOGON_TIMEOUT_MS - 1));
        assert!(conn.on_tick(LOGON_TIMEOUT_MS + 1));
    }

    /// Walks an initiator through two admin/application pairs, then
    /// feeds an inbound ResendRequest spanning both gaps and asserts
    /// the replay bridges each admin-only run with a GapFill whose
    /// MsgSeqNum is that run's historical start, not a freshly
    /// consumed forward sequence number.
    #[test]
    fn resend_request_replays_application_messages_and_gap_fills_admin_runs() {
        let dir = tempfile::tempdir().unwrap();
        let journal = new_journal(&dir);
        let mut conn = FixConnection::new("leg1".to_string(), network_config(), fix_config(), 1, 1, journal);
        let ring = Arc::new(Ring::with_capacity(1 << 16));

        conn.on_connected(ring.clone(), 0); // outbound Logon, seq 1
        drain_fix(&ring);

        let logon_ack = encode_admin(admin::LOGON, 1, &[]);
        conn.on_data(&logon_ack, 0); // transitions to LoggedOn

        conn.send_test_request(0).unwrap(); // seq 2, admin
        conn.send_application("D", &[(11, b"ORD-1")], 0).unwrap(); // seq 3, app
        conn.send_test_request(0).unwrap(); // seq 4, admin
        conn.send_application("D", &[(11, b"ORD-2")], 0).unwrap(); // seq 5, app
        drain_fix(&ring); // clear everything sent so far

        let resend_request = encode_admin(admin::RESEND_REQUEST, 2, &[(7, "2"), (16, "0")]);
        let result = conn.on_data(&resend_request, 0);
        assert!(!result.disconnect);

        let replayed = drain_fix(&ring);
        assert_eq!(replayed.len(), 4);

        let gap1 = IncomingFixMessage::parse(&replayed[0]).unwrap();
        assert_eq!(gap1.msg_type(), Some(admin::SEQUENCE_RESET));
        assert_eq!(gap1.msg_seq_num(), Some(2));
        assert_eq!(gap1.get_u64(36), Some(3));

        let app1 = IncomingFixMessage::parse(&replayed[1]).unwrap();
        assert_eq!(app1.msg_type(), Some("D"));
        assert_eq!(app1.msg_seq_num(), Some(3));
        assert_eq!(app1.get(TAG_POSS_DUP_FLAG), Some("Y"));

        let gap2 = IncomingFixMessage::parse(&replayed[2]).unwrap();
        assert_eq!(gap2.msg_type(), Some(admin::SEQUENCE_RESET));
        assert_eq!(gap2.msg_seq_num(), Some(4));
        assert_eq!(gap2.get_u64(36), Some(5));

        let app2 = IncomingFixMessage::parse(&replayed[3]).unwrap();
        assert_eq!(app2.msg_type(), Some("D"));
        assert_eq!(app2.msg_seq_num(), Some(5));
        assert_eq!(app2.get(TAG_POSS_DUP_FLAG), Some("Y"));
    }
}
