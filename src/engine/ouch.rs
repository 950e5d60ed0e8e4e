// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection OUCH wiring: frames SoupBinTCP packets off the wire,
//! drives the session state machine, and journals every sequenced
//! inbound/outbound message (spec §4.8).

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::codec::ouch::envelope::SoupBinFeed;
use crate::codec::ouch::{PacketType, SoupBinReader};
use crate::error::EngineError;
use crate::journal::{Direction, JournalRecord, JournalWriter};
use crate::ring::Ring;
use crate::session::ouch::{OuchSession, OuchSessionConfig, OuchSessionState};
use crate::session::{SessionAction, SessionError};
use crate::transport::tcp::NetworkConfig;

use super::{ouch_state_name, ConnectionStats, EngineListener, MessageDirection};

pub(crate) struct OnDataResult {
    pub consumed: usize,
    pub disconnect: bool,
}

pub struct OuchConnection {
    name: String,
    network: NetworkConfig,
    session_config: OuchSessionConfig,
    session: OuchSession,
    journal: JournalWriter,
    outbound: Option<Arc<Ring>>,
    last_sent_at_ms: u64,
    last_received_at_ms: u64,
    connected: bool,
    enabled: bool,
    reconnect_at_ms: Option<u64>,
    reconnect_attempts_used: u32,
    next_seq_for_journal: u32,
    stats: ConnectionStats,
    stats_handle: Arc<ArcSwap<ConnectionStats>>,
    listener: Option<Arc<dyn EngineListener + Send + Sync>>,
    last_reported_state: &'static str,
}

impl OuchConnection {
    pub fn new(
        name: String,
        network: NetworkConfig,
        session_config: OuchSessionConfig,
        next_in_seq_num: u64,
        journal: JournalWriter,
    ) -> Self {
        let session = OuchSession::new(session_config.clone(), next_in_seq_num);
        Self {
            name,
            network,
            session_config,
            session,
            journal,
            outbound: None,
            last_sent_at_ms: 0,
            last_received_at_ms: 0,
            connected: false,
            enabled: true,
            reconnect_at_ms: None,
            reconnect_attempts_used: 0,
            next_seq_for_journal: 1,
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
        let current = ouch_state_name(self.session.state());
        if current != self.last_reported_state {
            self.last_reported_state = current;
            log::info!("ouch[{}]: state -> {current}", self.name);
            if let Some(listener) = &self.listener {
                listener.on_state_change(&self.name, current);
            }
        }
    }

    pub fn on_connected(&mut self, outbound: Arc<Ring>, now_ms: u64) {
        self.outbound = Some(outbound);
        self.connected = true;
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
                log::warn!("ouch[{}]: outbound ring full, dropping message: {e}", self.name);
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
        self.journal_record(Direction::Outbound, bytes, now_ms);
    }

    fn journal_record(&mut self, direction: Direction, raw: &[u8], now_ms: u64) {
        let seq = self.next_seq_for_journal;
        self.next_seq_for_journal = self.next_seq_for_journal.wrapping_add(1);
        let record = JournalRecord {
            timestamp_epoch_ms: now_ms,
            sequence_number: seq,
            direction,
            metadata: Vec::new(),
            payload: raw.to_vec(),
        };
        if let Err(e) = self.journal.append(&record) {
            log::error!("ouch[{}]: journal append failed: {e}", self.name);
            self.note_error(e.to_string());
        }
    }

    fn apply_action(&mut self, action: SessionAction, now_ms: u64) {
        match action {
            SessionAction::None => {}
            SessionAction::Send(bytes) => self.send_tracked(&bytes, now_ms),
            SessionAction::SendMany(msgs) => {
                for bytes in msgs {
                    self.send_tracked(&bytes, now_ms);
                }
            }
            SessionAction::ResendRequested { .. } => {
                // SoupBinTCP has no analog to FIX's ResendRequest; the
                // server replays sequenced data from the login's
                // RequestedSequenceNumber instead (spec §4.8).
            }
            SessionAction::Disconnect => {}
            // OuchSession never emits this (SoupBinTCP's recovery path
            // is re-login, not an in-band Logout); handled for
            // exhaustiveness with FixConnection's usage of the same type.
            SessionAction::SendAndDisconnect(bytes) => self.send_tracked(&bytes, now_ms),
        }
    }

    pub(crate) fn on_data(&mut self, data: &[u8], now_ms: u64) -> OnDataResult {
        match SoupBinReader::feed(data) {
            Ok(SoupBinFeed::Frame { frame, consumed }) => {
                self.last_received_at_ms = now_ms;
                self.stats.messages_received += 1;
                self.journal_record(Direction::Inbound, &data[..consumed], now_ms);
                if let Some(listener) = &self.listener {
                    listener.on_message(&self.name, MessageDirection::Inbound, frame.payload);
                }

                let name = self.name.clone();
                let listener = self.listener.clone();
                let result = self.session.handle_incoming(&frame, now_ms, |payload| {
                    if let Some(listener) = &listener {
                        listener.on_message(&name, MessageDirection::Inbound, payload);
                    }
                });
                let disconnect = match result {
                    Ok(action) => {
                        let is_disconnect =
                            matches!(action, SessionAction::Disconnect | SessionAction::SendAndDisconnect(_));
                        self.apply_action(action, now_ms);
                        is_disconnect
                    }
                    Err(e) => {
                        log::warn!("ouch[{}]: session error: {e}", self.name);
                        self.note_error(e.to_string());
                        matches!(e, SessionError::Protocol(_))
                    }
                };
                self.report_state();
                self.publish_stats();
                OnDataResult { consumed, disconnect }
            }
            Ok(SoupBinFeed::NeedMoreData) => OnDataResult { consumed: 0, disconnect: false },
            Err(e) => {
                self.stats.reject_count += 1;
                self.note_error(e.to_string());
                log::warn!("ouch[{}]: rejected malformed frame: {e}", self.name);
                self.publish_stats();
                // No reliable frame boundary to resync on; drop
                // everything buffered so far.
                OnDataResult { consumed: data.len(), disconnect: false }
            }
        }
    }

    pub(crate) fn on_tick(&mut self, now_ms: u64) -> bool {
        if !self.connected || self.session.state() != OuchSessionState::LoggedIn {
            return false;
        }
        match self.session.on_peer_silent(now_ms) {
            Ok(action) => self.apply_action(action, now_ms),
            Err(e) => self.note_error(e.to_string()),
        }
        self.publish_stats();
        false
    }

    /// Only safe before `Engine::run` starts or between runs — see
    /// the equivalent note on `FixConnection::set_outgoing_seq_num`.
    pub fn set_incoming_seq_num(&mut self, n: u64) -> Result<(), EngineError> {
        self.session = OuchSession::new(self.session_config.clone(), n);
        Ok(())
    }

    pub fn send_heartbeat(&mut self, now_ms: u64) -> Result<(), EngineError> {
        match self.session.build_client_heartbeat() {
            Ok(bytes) => {
                self.send_tracked(&bytes, now_ms);
                Ok(())
            }
            Err(e) => Err(session_error_to_engine(e)),
        }
    }

    pub fn send_application(&mut self, payload: &[u8], now_ms: u64) -> Result<(), EngineError> {
        if self.session.state() != OuchSessionState::LoggedIn {
            return Err(EngineError::State(crate::error::StateError {
                attempted: "send-application-message",
                current: ouch_state_name(self.session.state()),
            }));
        }
        let mut buf = vec![0u8; 3 + payload.len()];
        let len = SoupBinReader::encode(&mut buf, PacketType::UnsequencedData, payload)
            .map_err(|e| EngineError::Config(crate::error::ConfigError { field: "payload", reason: e.to_string() }))?;
        buf.truncate(len);
        self.send_tracked(&buf, now_ms);
        Ok(())
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
    use std::net::SocketAddr;
    use std::time::Duration;

    fn ouch_config() -> OuchSessionConfig {
        OuchSessionConfig {
            username: "abc".to_string(),
            password: "secret".to_string(),
            requested_session: "".to_string(),
            heartbeat_interval: Duration::from_secs(1),
        }
    }

    fn network_config() -> NetworkConfig {
        NetworkConfig::initiator("127.0.0.1:0".parse::<SocketAddr>().unwrap())
    }

    fn new_journal(dir: &tempfile::TempDir) -> JournalWriter {
        JournalWriter::create(dir.path().join("ouch.log"), false, "ouch").unwrap()
    }

    fn frame(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 3 + payload.len()];
        let len = SoupBinReader::encode(&mut buf, packet_type, payload).unwrap();
        buf.truncate(len);
        buf
    }

    fn drain(ring: &Ring) -> Vec<Vec<u8>> {
        let mut seen = Vec::new();
        ring.read(|_type_id, payload| seen.push(payload.to_vec()));
        seen
    }

    #[test]
    fn login_request_sent_on_connect_and_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let journal = new_journal(&dir);
        let mut conn = OuchConnection::new("ouch1".to_string(), network_config(), ouch_config(), 1, journal);
        let ring = Arc::new(Ring::with_capacity(4096));

        conn.on_connected(ring.clone(), 0);

        let sent = drain(&ring);
        assert_eq!(sent.len(), 1);
        let login = match SoupBinReader::feed(&sent[0]).unwrap() {
            crate::codec::ouch::envelope::SoupBinFeed::Frame { frame, .. } => frame,
            _ => panic!("expected frame"),
        };
        assert_eq!(login.packet_type, PacketType::LoginRequest.to_byte());
        assert_eq!(conn.session.state(), OuchSessionState::LoginSent);
    }

    #[test]
    fn send_application_rejected_before_logged_in() {
        let dir = tempfile::tempdir().unwrap();
        let journal = new_journal(&dir);
        let mut conn = OuchConnection::new("ouch1".to_string(), network_config(), ouch_config(), 1, journal);
        let ring = Arc::new(Ring::with_capacity(4096));
        conn.on_connected(ring.clone(), 0);
        drain(&ring);

        let err = conn.send_application(b"order payload", 10).unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
        assert!(drain(&ring).is_empty());
    }

    #[test]
    fn heartbeat_emitted_on_peer_silence_via_on_tick() {
        let dir = tempfile::tempdir().unwrap();
        let journal = new_journal(&dir);
        let mut conn = OuchConnection::new("ouch1".to_string(), network_config(), ouch_config(), 1, journal);
        let ring = Arc::new(Ring::with_capacity(4096));
        conn.on_connected(ring.clone(), 0);
        drain(&ring); // consume the LoginRequest

        let accepted = frame(PacketType::LoginAccepted, b"");
        conn.on_data(&accepted, 0);
        drain(&ring);

        conn.on_tick(500);
        assert!(drain(&ring).is_empty());

        conn.on_tick(1_200);
        let sent = drain(&ring);
        assert_eq!(sent.len(), 1);
        let hb = match SoupBinReader::feed(&sent[0]).unwrap() {
            crate::codec::ouch::envelope::SoupBinFeed::Frame { frame, .. } => frame,
            _ => panic!("expected frame"),
        };
        assert_eq!(hb.packet_type, PacketType::ClientHeartbeat.to_byte());
    }
}
