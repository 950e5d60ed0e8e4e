// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error taxonomy (spec §7).
//!
//! Each subsystem owns its own error enum (`BufError`, `RingError`,
//! `CodecError`, `SessionError`, `JournalError`, `ReactorError`,
//! `ConfigError`); this module only defines the engine-level
//! `EngineError` that composes them at the public boundary, plus the
//! `StateError` shared by every component with a lifecycle.

use std::fmt;

use crate::journal::JournalError;
use crate::ring::RingError;
use crate::transport::tcp::ReactorError;

/// A component attempted an illegal lifecycle transition (engine
/// lifecycle, session state machine). Never surfaced to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateError {
    pub attempted: &'static str,
    pub current: &'static str,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal transition to {} from {}",
            self.attempted, self.current
        )
    }
}

impl std::error::Error for StateError {}

/// A peer's `MsgSeqNum` did not match what a FIX session expected
/// (spec §7). `TooLow` (without `PossDupFlag`) is fatal: the session
/// sends a Logout and disconnects. `GapDetected` triggers a
/// ResendRequest and is otherwise recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceErrorKind {
    TooLow,
    GapDetected { expected: u64, actual: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceError {
    pub kind: SequenceErrorKind,
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SequenceErrorKind::TooLow => write!(f, "MsgSeqNum too low, no PossDupFlag"),
            SequenceErrorKind::GapDetected { expected, actual } => {
                write!(f, "MsgSeqNum gap: expected {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for SequenceError {}

/// Ring buffer has no room for a claim. Surfaced to the producer
/// synchronously; callers decide whether to retry, drop, or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressureFull;

impl fmt::Display for BackpressureFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring buffer full (backpressure)")
    }
}

impl std::error::Error for BackpressureFull {}

/// A configuration value was missing or invalid at factory time.
/// Terminal for the component graph: raised before the engine starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config field `{}`: {}", self.field, self.reason)
    }
}

impl std::error::Error for ConfigError {}

/// Top-level error returned by the engine's public API (session
/// creation, connect/disconnect, send). Wraps the per-subsystem
/// errors without forcing callers to match on internal detail they
/// usually don't need.
#[derive(Debug)]
pub enum EngineError {
    State(StateError),
    Sequence(SequenceError),
    Backpressure(BackpressureFull),
    Config(ConfigError),
    Journal(JournalError),
    Ring(RingError),
    Reactor(ReactorError),
    Io(std::io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(e) => write!(f, "{e}"),
            Self::Sequence(e) => write!(f, "{e}"),
            Self::Backpressure(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::Journal(e) => write!(f, "{e}"),
            Self::Ring(e) => write!(f, "{e}"),
            Self::Reactor(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StateError> for EngineError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

impl From<SequenceError> for EngineError {
    fn from(e: SequenceError) -> Self {
        Self::Sequence(e)
    }
}

impl From<BackpressureFull> for EngineError {
    fn from(e: BackpressureFull) -> Self {
        Self::Backpressure(e)
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<JournalError> for EngineError {
    fn from(e: JournalError) -> Self {
        Self::Journal(e)
    }
}

impl From<RingError> for EngineError {
    fn from(e: RingError) -> Self {
        Self::Ring(e)
    }
}

impl From<ReactorError> for EngineError {
    fn from(e: ReactorError) -> Self {
        Self::Reactor(e)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Lifecycle states shared by the reactor, sessions, and the journal
/// writer (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Active,
    Standby,
    Stopped,
}

impl LifecycleState {
    fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initialized => "Initialized",
            Self::Active => "Active",
            Self::Standby => "Standby",
            Self::Stopped => "Stopped",
        }
    }

    /// Validates `self -> to` against the legal transition table:
    /// `Uninitialized -> Initialized -> {Active | Standby}`,
    /// `Active <-> Standby`, any -> `Stopped`.
    pub fn validate_transition(self, to: Self) -> Result<(), StateError> {
        use LifecycleState::*;
        let legal = matches!(
            (self, to),
            (Uninitialized, Initialized)
                | (Initialized, Active)
                | (Initialized, Standby)
                | (Active, Standby)
                | (Standby, Active)
                | (_, Stopped)
        );
        if legal {
            Ok(())
        } else {
            Err(StateError {
                attempted: to.name(),
                current: self.name(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_lifecycle_transitions_succeed() {
        assert!(LifecycleState::Uninitialized
            .validate_transition(LifecycleState::Initialized)
            .is_ok());
        assert!(LifecycleState::Initialized
            .validate_transition(LifecycleState::Active)
            .is_ok());
        assert!(LifecycleState::Active
            .validate_transition(LifecycleState::Standby)
            .is_ok());
        assert!(LifecycleState::Standby
            .validate_transition(LifecycleState::Active)
            .is_ok());
        assert!(LifecycleState::Active
            .validate_transition(LifecycleState::Stopped)
            .is_ok());
    }

    #[test]
    fn illegal_lifecycle_transitions_fail() {
        let err = LifecycleState::Uninitialized
            .validate_transition(LifecycleState::Active)
            .unwrap_err();
        assert_eq!(err.attempted, "Active");
        assert_eq!(err.current, "Uninitialized");
    }
}
