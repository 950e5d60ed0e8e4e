// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed configuration structs (spec §6). Parsing a config file
//! (HOCON/YAML/whatever the deployment prefers) is outside this
//! crate's scope — callers build these structs directly or via their
//! own loader and hand the engine already-validated values.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::session::fix::FixSessionConfig;
use crate::session::ouch::OuchSessionConfig;
use crate::transport::tcp::NetworkConfig;

/// Where journal streams for every session live. One directory holds
/// every session's `*.log`/`*.fixlog` files (spec §4.9).
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub base_path: PathBuf,
    pub sync_on_write: bool,
}

impl PersistenceConfig {
    pub fn new(base_path: impl Into<PathBuf>, sync_on_write: bool) -> Self {
        Self { base_path: base_path.into(), sync_on_write }
    }
}

/// One FIX session's full configuration: identity, transport, and
/// durability settings bundled so the engine can construct the
/// session, its channel, and its journal stream together.
#[derive(Debug, Clone)]
pub struct FixSessionSpec {
    pub name: String,
    pub session: FixSessionConfig,
    pub network: NetworkConfig,
}

/// One OUCH session's full configuration.
#[derive(Debug, Clone)]
pub struct OuchSessionSpec {
    pub name: String,
    pub session: OuchSessionConfig,
    pub network: NetworkConfig,
}

/// Top-level engine configuration: every configured session plus
/// shared persistence settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub persistence: PersistenceConfig,
    pub fix_sessions: Vec<FixSessionSpec>,
    pub ouch_sessions: Vec<OuchSessionSpec>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fix_sessions.is_empty() && self.ouch_sessions.is_empty() {
            return Err(ConfigError {
                field: "fix_sessions/ouch_sessions",
                reason: "at least one session must be configured".to_string(),
            });
        }
        let mut names = std::collections::HashSet::new();
        for spec in &self.fix_sessions {
            if !names.insert(spec.name.clone()) {
                return Err(ConfigError { field: "name", reason: format!("duplicate session name `{}`", spec.name) });
            }
            if spec.session.heartbeat_interval < Duration::from_secs(1) {
                return Err(ConfigError {
                    field: "heartbeat_interval",
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }
        for spec in &self.ouch_sessions {
            if !names.insert(spec.name.clone()) {
                return Err(ConfigError { field: "name", reason: format!("duplicate session name `{}`", spec.name) });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::fix::FixSessionConfig;

    fn sample_fix_spec(name: &str) -> FixSessionSpec {
        FixSessionSpec {
            name: name.to_string(),
            session: FixSessionConfig {
                begin_string: "FIX.4.4".to_string(),
                sender_comp_id: "US".to_string(),
                target_comp_id: "THEM".to_string(),
                heartbeat_interval: Duration::from_secs(30),
                is_acceptor: false,
            },
            network: NetworkConfig::initiator("127.0.0.1:9000".parse().unwrap()),
        }
    }

    #[test]
    fn rejects_empty_session_list() {
        let cfg = EngineConfig {
            persistence: PersistenceConfig::new("/tmp/omnibridge", true),
            fix_sessions: vec![],
            ouch_sessions: vec![],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let cfg = EngineConfig {
            persistence: PersistenceConfig::new("/tmp/omnibridge", true),
            fix_sessions: vec![sample_fix_spec("alpha"), sample_fix_spec("alpha")],
            ouch_sessions: vec![],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        let cfg = EngineConfig {
            persistence: PersistenceConfig::new("/tmp/omnibridge", true),
            fix_sessions: vec![sample_fix_spec("alpha")],
            ouch_sessions: vec![],
        };
        assert!(cfg.validate().is_ok());
    }
}
