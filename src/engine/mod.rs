// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The engine (C2, spec §4.10, §6): wires the reactor, journals, and
//! session state machines together behind the external API a host
//! process drives (create/enable/disable/connect/send/listen, spec
//! §6). One `Engine` owns one [`Reactor`] and every session configured
//! into it; sessions never see the network or the journal directly.

pub mod fix;
pub mod ouch;

pub use fix::FixConnection;
pub use ouch::OuchConnection;

use std::io;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::error::{EngineError, LifecycleState};
use crate::journal::{Direction, JournalTailer, JournalWriter};
use crate::session::ouch::OuchSessionState;
use crate::time::now_millis;
use crate::transport::tcp::{ConnectionId, NetworkConfig, Reactor, ReactorCallbacks, ReactorHandle};

/// Point-in-time counters a host process can poll without touching the
/// reactor thread (spec §3.1). Updated on the reactor thread, read
/// through the lock-free snapshot in [`Engine::stats`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reject_count: u64,
    pub last_error: Option<String>,
}

/// Direction tag handed to [`EngineListener::on_message`] so one
/// callback can distinguish what it is looking at without the caller
/// threading two separate closures through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Host-supplied hooks for session state changes and message traffic
/// (spec §6 "register state-change listener"/"register message
/// listener"). Both methods default to no-ops so a caller only
/// interested in one can ignore the other; invoked from the reactor
/// thread, so implementations must not block (same contract as
/// [`ReactorCallbacks`]).
pub trait EngineListener {
    fn on_state_change(&self, _session_name: &str, _new_state: &str) {}
    fn on_message(&self, _session_name: &str, _direction: MessageDirection, _raw: &[u8]) {}
}

/// Recovers `(next_out_seq_num, next_in_seq_num)` for a FIX session
/// from its journal stream, scanning every record rather than trusting
/// any cached counter (same discipline as the journal's own offset
/// recovery). Absent a stream, both sequences start at 1.
pub fn fix_from_journal(path: &std::path::Path) -> Result<(u64, u64), EngineError> {
    if !path.exists() {
        return Ok((1, 1));
    }
    let mut tailer = JournalTailer::open(path)?;
    let mut next_out = 1u64;
    let mut next_in = 1u64;
    while let Some(record) = tailer.next_record()? {
        match record.direction {
            Direction::Outbound => next_out = next_out.max(record.sequence_number as u64 + 1),
            Direction::Inbound => next_in = next_in.max(record.sequence_number as u64 + 1),
        }
    }
    Ok((next_out, next_in))
}

/// Recovers `next_in_seq_num` for an OUCH session from its journal
/// stream: the highest inbound sequenced-data entry plus one, or 1 if
/// the stream is empty or absent (spec §4.8 `RequestedSequenceNumber`
/// recovery).
pub fn ouch_from_journal(path: &std::path::Path) -> Result<u64, EngineError> {
    if !path.exists() {
        return Ok(1);
    }
    let mut tailer = JournalTailer::open(path)?;
    let mut next_in = 1u64;
    while let Some(record) = tailer.next_record()? {
        if record.direction == Direction::Inbound {
            next_in = next_in.max(record.sequence_number as u64 + 1);
        }
    }
    Ok(next_in)
}

enum Connection {
    Fix(FixConnection),
    Ouch(OuchConnection),
}

impl Connection {
    fn name(&self) -> &str {
        match self {
            Self::Fix(c) => c.name(),
            Self::Ouch(c) => c.name(),
        }
    }

    fn network(&self) -> &NetworkConfig {
        match self {
            Self::Fix(c) => c.network(),
            Self::Ouch(c) => c.network(),
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            Self::Fix(c) => c.is_enabled(),
            Self::Ouch(c) => c.is_enabled(),
        }
    }
}

/// Implements [`ReactorCallbacks`] on behalf of every configured
/// session, split out from [`Engine`] so `Engine::run` can borrow the
/// reactor and this state independently (`self.reactor.run(&mut
/// self.state)`; a method on `Engine` itself taking `&mut self` could
/// not also hand the reactor a mutable borrow of `self`).
struct EngineState {
    connections: std::collections::HashMap<ConnectionId, Connection>,
    name_index: Arc<DashMap<String, ConnectionId>>,
    stats_index: Arc<DashMap<String, Arc<ArcSwap<ConnectionStats>>>>,
    handle: ReactorHandle,
}

impl EngineState {
    fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }
}

impl ReactorCallbacks for EngineState {
    fn on_connected(&mut self, id: ConnectionId, outbound: Arc<crate::ring::Ring>) {
        let now_ms = now_millis();
        if let Some(conn) = self.connection_mut(id) {
            match conn {
                Connection::Fix(c) => c.on_connected(outbound, now_ms),
                Connection::Ouch(c) => c.on_connected(outbound, now_ms),
            }
        }
    }

    fn on_connect_failed(&mut self, id: ConnectionId, error: &io::Error) {
        log::warn!("engine: connect failed for {id:?}: {error}");
        let now_ms = now_millis();
        if let Some(conn) = self.connection_mut(id) {
            match conn {
                Connection::Fix(c) => c.on_connect_failed(now_ms),
                Connection::Ouch(c) => c.on_connect_failed(now_ms),
            }
        }
    }

    fn on_data_received(&mut self, id: ConnectionId, data: &[u8]) -> usize {
        let now_ms = now_millis();
        let disconnect = match self.connection_mut(id) {
            Some(Connection::Fix(c)) => {
                let result = c.on_data(data, now_ms);
                if result.disconnect {
                    let _ = self.handle.close(id);
                }
                return result.consumed;
            }
            Some(Connection::Ouch(c)) => {
                let result = c.on_data(data, now_ms);
                if result.disconnect {
                    let _ = self.handle.close(id);
                }
                return result.consumed;
            }
            None => false,
        };
        if disconnect {
            let _ = self.handle.close(id);
        }
        0
    }

    fn on_disconnected(&mut self, id: ConnectionId) {
        let now_ms = now_millis();
        if let Some(conn) = self.connection_mut(id) {
            match conn {
                Connection::Fix(c) => c.on_disconnected(now_ms),
                Connection::Ouch(c) => c.on_disconnected(now_ms),
            }
        }
    }

    fn on_tick(&mut self) {
        let now_ms = now_millis();
        let mut to_close = Vec::new();
        let mut to_connect = Vec::new();
        for (id, conn) in self.connections.iter_mut() {
            let disconnect = match conn {
                Connection::Fix(c) => c.on_tick(now_ms),
                Connection::Ouch(c) => c.on_tick(now_ms),
            };
            if disconnect {
                to_close.push(*id);
            } else if conn.is_enabled() && conn.network().role == crate::transport::tcp::ConnectionRole::Initiator {
                let due = match conn {
                    Connection::Fix(c) => c.reconnect_due(now_ms),
                    Connection::Ouch(c) => c.reconnect_due(now_ms),
                };
                if due {
                    to_connect.push((*id, conn.network().clone()));
                }
            }
        }
        for id in to_close {
            let _ = self.handle.close(id);
        }
        for (id, network) in to_connect {
            let _ = self.handle.connect(id, network);
        }
    }
}

/// Owns the reactor thread-of-control (run on whichever thread calls
/// [`Engine::run`]) plus every session configured into it.
pub struct Engine {
    reactor: Reactor,
    handle: ReactorHandle,
    state: EngineState,
    lifecycle: LifecycleState,
}

impl Engine {
    /// Builds every configured session and its journal stream, but
    /// does not yet connect or listen (spec §6 "Create session").
    /// Sequence-number recovery from prior journals happens here, via
    /// [`fix_from_journal`]/[`ouch_from_journal`], before any session
    /// is constructed.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        std::fs::create_dir_all(&config.persistence.base_path)?;

        let poll_mode = config
            .fix_sessions
            .first()
            .map(|s| s.network.poll_mode())
            .or_else(|| config.ouch_sessions.first().map(|s| s.network.poll_mode()))
            .unwrap_or(crate::transport::tcp::PollMode::Cooperative { poll_timeout: std::time::Duration::from_millis(100) });
        let (reactor, handle) = Reactor::new(poll_mode)?;

        let name_index: Arc<DashMap<String, ConnectionId>> = Arc::new(DashMap::new());
        let stats_index: Arc<DashMap<String, Arc<ArcSwap<ConnectionStats>>>> = Arc::new(DashMap::new());
        let mut connections = std::collections::HashMap::new();
        let mut next_id = 0u64;

        for spec in &config.fix_sessions {
            let id = ConnectionId(next_id);
            next_id += 1;
            let stream_path = config.persistence.base_path.join(format!("{}.log", crate::journal::stream_name(&spec.name)));
            let (next_out, next_in) = fix_from_journal(&stream_path)?;
            let journal = JournalWriter::create(&stream_path, config.persistence.sync_on_write, "omnibridge.FixEntry")?;
            let conn = FixConnection::new(spec.name.clone(), spec.network.clone(), spec.session.clone(), next_out, next_in, journal);
            name_index.insert(spec.name.clone(), id);
            stats_index.insert(spec.name.clone(), conn.stats_handle());
            connections.insert(id, Connection::Fix(conn));
        }

        for spec in &config.ouch_sessions {
            let id = ConnectionId(next_id);
            next_id += 1;
            let stream_path = config.persistence.base_path.join(format!("{}.log", crate::journal::stream_name(&spec.name)));
            let next_in = ouch_from_journal(&stream_path)?;
            let journal = JournalWriter::create(&stream_path, config.persistence.sync_on_write, "omnibridge.OuchEntry")?;
            let conn = OuchConnection::new(spec.name.clone(), spec.network.clone(), spec.session.clone(), next_in, journal);
            name_index.insert(spec.name.clone(), id);
            stats_index.insert(spec.name.clone(), conn.stats_handle());
            connections.insert(id, Connection::Ouch(conn));
        }

        Ok(Self {
            reactor,
            handle: handle.clone(),
            state: EngineState { connections, name_index, stats_index, handle },
            lifecycle: LifecycleState::Uninitialized,
        })
    }

    fn resolve(&self, name: &str) -> Option<ConnectionId> {
        self.state.name_index.get(name).map(|e| *e)
    }

    /// Issues connect/listen for every enabled session and moves the
    /// engine's lifecycle to `Active` (spec §4.10).
    pub fn start_active(&mut self) -> Result<(), EngineError> {
        self.lifecycle.validate_transition(LifecycleState::Initialized)?;
        self.lifecycle = LifecycleState::Initialized;
        self.lifecycle.validate_transition(LifecycleState::Active)?;
        self.lifecycle = LifecycleState::Active;
        for (id, conn) in &self.state.connections {
            if !conn.is_enabled() {
                continue;
            }
            match conn.network().role {
                crate::transport::tcp::ConnectionRole::Initiator => {
                    self.handle.connect(*id, conn.network().clone())?;
                }
                crate::transport::tcp::ConnectionRole::Acceptor => {
                    self.handle.listen(*id, conn.network().clone())?;
                }
            }
        }
        Ok(())
    }

    /// Moves the engine to `Standby` without connecting anything —
    /// the paired HA instance is expected to be `Active` (spec §4.10).
    pub fn start_standby(&mut self) -> Result<(), EngineError> {
        self.lifecycle.validate_transition(LifecycleState::Initialized)?;
        self.lifecycle = LifecycleState::Initialized;
        self.lifecycle.validate_transition(LifecycleState::Standby)?;
        self.lifecycle = LifecycleState::Standby;
        Ok(())
    }

    /// Runs the reactor loop on the calling thread until [`Engine::stop`]
    /// is invoked from another thread.
    pub fn run(&mut self) -> Result<(), EngineError> {
        self.reactor.run(&mut self.state)?;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.lifecycle = LifecycleState::Stopped;
        self.handle.stop();
    }

    pub fn connect(&self, name: &str) -> Result<(), EngineError> {
        let id = self.resolve(name).ok_or_else(|| unknown_session(name))?;
        let network = self.state.connections.get(&id).map(|c| c.network().clone()).ok_or_else(|| unknown_session(name))?;
        Ok(self.handle.connect(id, network)?)
    }

    pub fn disconnect(&self, name: &str) -> Result<(), EngineError> {
        let id = self.resolve(name).ok_or_else(|| unknown_session(name))?;
        Ok(self.handle.close(id)?)
    }

    pub fn enable(&mut self, name: &str) -> Result<(), EngineError> {
        let id = self.resolve(name).ok_or_else(|| unknown_session(name))?;
        if let Some(conn) = self.state.connections.get_mut(&id) {
            match conn {
                Connection::Fix(c) => c.set_enabled(true),
                Connection::Ouch(c) => c.set_enabled(true),
            }
        }
        Ok(())
    }

    pub fn disable(&mut self, name: &str) -> Result<(), EngineError> {
        let id = self.resolve(name).ok_or_else(|| unknown_session(name))?;
        if let Some(conn) = self.state.connections.get_mut(&id) {
            match conn {
                Connection::Fix(c) => c.set_enabled(false),
                Connection::Ouch(c) => c.set_enabled(false),
            }
        }
        Ok(())
    }

    /// Rebuilds the named FIX session with a new outgoing sequence
    /// number. Only safe before [`Engine::run`] starts or between
    /// runs: the reactor thread owns `EngineState` exclusively while
    /// `run` is executing (spec §4.4 single-writer-thread discipline).
    pub fn set_outgoing_seq_num(&mut self, name: &str, n: u64) -> Result<(), EngineError> {
        self.with_fix(name, |c| c.set_outgoing_seq_num(n))
    }

    pub fn set_incoming_seq_num(&mut self, name: &str, n: u64) -> Result<(), EngineError> {
        self.with_fix_or_ouch(
            name,
            |c| c.set_incoming_seq_num(n),
            |c| c.set_incoming_seq_num(n),
        )
    }

    pub fn reset_sequences(&mut self, name: &str) -> Result<(), EngineError> {
        self.with_fix(name, |c| c.reset_sequences())
    }

    pub fn send_test_request(&mut self, name: &str) -> Result<(), EngineError> {
        let now_ms = now_millis();
        self.with_fix_or_ouch(
            name,
            |c| c.send_test_request(now_ms),
            |c| c.send_heartbeat(now_ms),
        )
    }

    pub fn send_fix_application(&mut self, name: &str, msg_type: &str, fields: &[(u32, &[u8])]) -> Result<(), EngineError> {
        let now_ms = now_millis();
        self.with_fix(name, |c| c.send_application(msg_type, fields, now_ms))
    }

    pub fn send_ouch_application(&mut self, name: &str, payload: &[u8]) -> Result<(), EngineError> {
        let now_ms = now_millis();
        self.with_ouch(name, |c| c.send_application(payload, now_ms))
    }

    pub fn register_listener(&mut self, name: &str, listener: Arc<dyn EngineListener + Send + Sync>) -> Result<(), EngineError> {
        let id = self.resolve(name).ok_or_else(|| unknown_session(name))?;
        if let Some(conn) = self.state.connections.get_mut(&id) {
            match conn {
                Connection::Fix(c) => c.set_listener(listener),
                Connection::Ouch(c) => c.set_listener(listener),
            }
        }
        Ok(())
    }

    /// Snapshot of one session's observability counters (spec §3.1),
    /// readable from any thread without coordinating with the reactor.
    pub fn stats(&self, name: &str) -> Option<ConnectionStats> {
        self.state.stats_index.get(name).map(|h| (**h.load()).clone())
    }

    fn with_fix(&mut self, name: &str, f: impl FnOnce(&mut FixConnection) -> Result<(), EngineError>) -> Result<(), EngineError> {
        let id = self.resolve(name).ok_or_else(|| unknown_session(name))?;
        match self.state.connections.get_mut(&id) {
            Some(Connection::Fix(c)) => f(c),
            _ => Err(unknown_session(name)),
        }
    }

    fn with_ouch(&mut self, name: &str, f: impl FnOnce(&mut OuchConnection) -> Result<(), EngineError>) -> Result<(), EngineError> {
        let id = self.resolve(name).ok_or_else(|| unknown_session(name))?;
        match self.state.connections.get_mut(&id) {
            Some(Connection::Ouch(c)) => f(c),
            _ => Err(unknown_session(name)),
        }
    }

    fn with_fix_or_ouch(
        &mut self,
        name: &str,
        on_fix: impl FnOnce(&mut FixConnection) -> Result<(), EngineError>,
        on_ouch: impl FnOnce(&mut OuchConnection) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let id = self.resolve(name).ok_or_else(|| unknown_session(name))?;
        match self.state.connections.get_mut(&id) {
            Some(Connection::Fix(c)) => on_fix(c),
            Some(Connection::Ouch(c)) => on_ouch(c),
            None => Err(unknown_session(name)),
        }
    }
}

fn unknown_session(name: &str) -> EngineError {
    EngineError::Config(crate::error::ConfigError { field: "name", reason: format!("no session named `{name}`") })
}

/// `OuchSessionState::name()` is private to its module; this mirrors
/// it for [`EngineListener::on_state_change`], which needs a label for
/// both FIX (already public via `FixSessionState::name()`) and OUCH
/// session states.
pub(crate) fn ouch_state_name(state: OuchSessionState) -> &'static str {
    match state {
        OuchSessionState::Created => "Created",
        OuchSessionState::Connecting => "Connecting",
        OuchSessionState::Connected => "Connected",
        OuchSessionState::LoginSent => "LoginSent",
        OuchSessionState::LoggedIn => "LoggedIn",
        OuchSessionState::LogoutSent => "LogoutSent",
        OuchSessionState::Disconnected => "Disconnected",
        OuchSessionState::Stopped => "Stopped",
    }
}
