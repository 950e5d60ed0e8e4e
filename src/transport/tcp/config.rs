// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport configuration (spec §6).

use std::net::SocketAddr;
use std::time::Duration;

/// Whether a configured endpoint listens for an inbound connection or
/// dials out to a peer (spec §6 `role`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Acceptor,
    Initiator,
}

/// Per-endpoint TCP settings. One instance backs exactly one FIX or
/// OUCH session's transport; there is no shared listener fan-out
/// since OmniBridge sessions are each a dedicated connection (spec §2
/// Non-goals: no multi-session multiplexing over one socket).
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Human-readable label for logging (spec §6 `name`); not used for
    /// lookup or routing.
    pub name: String,
    pub role: ConnectionRole,
    /// Address to bind (Acceptor) or dial (Initiator).
    pub address: SocketAddr,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: Option<u32>,
    pub nodelay: bool,
    pub recv_buffer_size: Option<usize>,
    pub send_buffer_size: Option<usize>,
    pub keepalive: bool,
    pub keepalive_interval: Duration,
    /// Largest single frame the reactor will assemble before handing
    /// bytes to the codec; guards against an unbounded read buffer
    /// growing from a malformed or hostile peer.
    pub max_message_size: usize,
    /// CPU core this connection's reactor should pin to; `-1` disables
    /// pinning (spec §6 `cpu_affinity`). Binding the calling thread to
    /// a core is an external primitive (`pin_current_thread`, spec §1
    /// Non-goals) — this crate only carries the configured value
    /// through to whatever invokes that primitive.
    pub cpu_affinity: i32,
    /// Per-channel read-buffer size in bytes (spec §6 `read_buffer_size`).
    pub read_buffer_size: usize,
    /// Per-channel write-buffer size in bytes (spec §6 `write_buffer_size`).
    pub write_buffer_size: usize,
    /// Power-of-two capacity of the outbound MPSC ring buffer (spec §6
    /// `ring_buffer_capacity`).
    pub ring_buffer_capacity: usize,
    /// `true` selects non-blocking `select_now` busy-spin polling;
    /// `false` selects cooperative polling bounded by
    /// `select_timeout_ms` (spec §6 `busy_spin_mode`).
    pub busy_spin_mode: bool,
    /// Cooperative-mode poll timeout in milliseconds (spec §6
    /// `select_timeout_ms`, default 100).
    pub select_timeout_ms: u64,
}

impl NetworkConfig {
    pub fn initiator(address: SocketAddr) -> Self {
        Self {
            name: String::new(),
            role: ConnectionRole::Initiator,
            address,
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: None,
            nodelay: true,
            recv_buffer_size: None,
            send_buffer_size: None,
            keepalive: true,
            keepalive_interval: Duration::from_secs(30),
            max_message_size: 64 * 1024,
            cpu_affinity: -1,
            read_buffer_size: 64 * 1024,
            write_buffer_size: 64 * 1024,
            ring_buffer_capacity: 1 << 20,
            busy_spin_mode: false,
            select_timeout_ms: 100,
        }
    }

    pub fn acceptor(address: SocketAddr) -> Self {
        Self {
            role: ConnectionRole::Acceptor,
            ..Self::initiator(address)
        }
    }

    /// Converts this config's `busy_spin_mode`/`select_timeout_ms`
    /// pair into the [`PollMode`] the reactor's event loop consumes.
    pub fn poll_mode(&self) -> super::reactor::PollMode {
        if self.busy_spin_mode {
            super::reactor::PollMode::BusySpin
        } else {
            super::reactor::PollMode::Cooperative { poll_timeout: Duration::from_millis(self.select_timeout_ms) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiator_defaults_are_sane() {
        let cfg = NetworkConfig::initiator("127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.role, ConnectionRole::Initiator);
        assert!(cfg.nodelay);
        assert!(cfg.max_message_size > 0);
        assert_eq!(cfg.cpu_affinity, -1);
        assert_eq!(cfg.ring_buffer_capacity, 1 << 20);
    }

    #[test]
    fn poll_mode_reflects_busy_spin_flag() {
        let mut cfg = NetworkConfig::initiator("127.0.0.1:9000".parse().unwrap());
        assert!(matches!(cfg.poll_mode(), super::reactor::PollMode::Cooperative { .. }));
        cfg.busy_spin_mode = true;
        assert!(matches!(cfg.poll_mode(), super::reactor::PollMode::BusySpin));
    }
}
