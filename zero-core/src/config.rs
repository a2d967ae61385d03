//! The config surface of `spec.md` §6.
//!
//! Reading these values from a file, environment variables, or the CLI is an
//! external collaborator's job (`spec.md` §1 non-goals); this module only
//! fixes the shape so in-workspace components (permission transformer,
//! view-syncer) have a stable type to program against.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

/// Exactly one of `jwk`, `jwks_url`, `secret` is expected to be set; that
/// exclusivity is enforced by the (external) auth-token verifier, not by
/// this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwk: Option<String>,
    pub jwks_url: Option<String>,
    pub secret: Option<String>,
}

fn default_window_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationLimitConfig {
    pub max: Option<u64>,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for MutationLimitConfig {
    fn default() -> Self {
        MutationLimitConfig {
            max: None,
            window_ms: default_window_ms(),
        }
    }
}

fn default_port() -> u16 {
    4848
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub change_streamer_port: Option<u16>,
    pub heartbeat_monitor_port: Option<u16>,
}

impl PortConfig {
    pub fn change_streamer_port(&self) -> u16 {
        self.change_streamer_port.unwrap_or(self.port + 1)
    }

    pub fn heartbeat_monitor_port(&self) -> u16 {
        self.heartbeat_monitor_port.unwrap_or(self.port + 2)
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            port: default_port(),
            change_streamer_port: None,
            heartbeat_monitor_port: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZeroConfig {
    pub upstream_db_uri: String,
    pub cvr_db_uri: String,
    pub change_log_db_uri: String,
    pub replica_file_path: String,

    pub shard_id: Option<String>,
    #[serde(default)]
    pub publications: Vec<String>,

    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub per_user_mutation_limit: MutationLimitConfig,
    #[serde(default)]
    pub ports: PortConfig,

    pub num_sync_workers: Option<usize>,
    #[serde(default)]
    pub auto_reset: bool,
    pub litestream: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_config_derives_dependent_ports() {
        let p = PortConfig::default();
        assert_eq!(p.port, 4848);
        assert_eq!(p.change_streamer_port(), 4849);
        assert_eq!(p.heartbeat_monitor_port(), 4850);
    }

    #[test]
    fn port_config_respects_explicit_overrides() {
        let p = PortConfig {
            port: 5000,
            change_streamer_port: Some(9000),
            heartbeat_monitor_port: None,
        };
        assert_eq!(p.change_streamer_port(), 9000);
        assert_eq!(p.heartbeat_monitor_port(), 5002);
    }
}
