// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport: the reactor (C5), its per-connection channel state
//! (C4), and connection configuration.

pub mod channel;
pub mod config;
pub mod reactor;

pub use channel::{DrainOutcome, ReadOutcome, TcpChannel};
pub use config::{ConnectionRole, NetworkConfig};
pub use reactor::{
    ConnectionId, PollMode, Reactor, ReactorCallbacks, ReactorError, ReactorHandle,
};
