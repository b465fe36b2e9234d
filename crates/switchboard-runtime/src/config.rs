//! # Runtime Configuration
//!
//! One document covering every hosted component. Loaded from an optional
//! JSON file named by `SWITCHBOARD_CONFIG`, then adjusted by individual
//! `SWITCHBOARD_*` environment variables. Unset means defaults; a bad
//! override is logged and skipped rather than fatal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchboard_client::config::humantime_serde;
use switchboard_client::{ClientConfig, ReplyMode};
use switchboard_dispatch::DispatcherConfig;
use switchboard_gateway::GatewayConfig;
use thiserror::Error;
use tracing::{info, warn};

/// Path of the optional JSON configuration file.
pub const ENV_CONFIG_FILE: &str = "SWITCHBOARD_CONFIG";
/// Gateway bind host override.
pub const ENV_HTTP_HOST: &str = "SWITCHBOARD_HTTP_HOST";
/// Gateway bind port override.
pub const ENV_HTTP_PORT: &str = "SWITCHBOARD_HTTP_PORT";
/// Call deadline override for both the gateway and the client,
/// in humantime form ("5s", "1500ms").
pub const ENV_CALL_TIMEOUT: &str = "SWITCHBOARD_CALL_TIMEOUT";
/// Reply routing override: "shared" or "per_call".
pub const ENV_REPLY_MODE: &str = "SWITCHBOARD_REPLY_MODE";
/// Acknowledgement override: "auto" or "manual".
pub const ENV_ACK_MODE: &str = "SWITCHBOARD_ACK_MODE";

/// Failures while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Client(#[from] switchboard_client::ConfigError),

    #[error(transparent)]
    Gateway(#[from] switchboard_gateway::ConfigError),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// HTTP gateway settings.
    pub gateway: GatewayConfig,
    /// RPC client settings shared by the gateway.
    pub client: ClientConfig,
    /// Settings applied to every hosted service dispatcher.
    pub dispatcher: DispatcherConfig,
}

impl RuntimeConfig {
    /// Load from `SWITCHBOARD_CONFIG` if set, apply environment
    /// overrides, and validate the result.
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut config = match std::env::var(ENV_CONFIG_FILE) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file. Missing sections fall back to
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.client.validate()?;
        self.gateway.validate()?;
        Ok(())
    }

    /// Fold `SWITCHBOARD_*` environment variables into the config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var(ENV_HTTP_HOST) {
            match host.parse() {
                Ok(host) => self.gateway.host = host,
                Err(_) => warn!(%host, "{ENV_HTTP_HOST} is not an IP address, ignoring"),
            }
        }
        if let Ok(port) = std::env::var(ENV_HTTP_PORT) {
            match port.parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => warn!(%port, "{ENV_HTTP_PORT} is not a port number, ignoring"),
            }
        }
        if let Ok(timeout) = std::env::var(ENV_CALL_TIMEOUT) {
            match humantime_serde::parse_duration(&timeout) {
                Ok(duration) => {
                    self.gateway.call_timeout = duration;
                    self.client.default_timeout = duration;
                }
                Err(_) => warn!(%timeout, "{ENV_CALL_TIMEOUT} is not a duration, ignoring"),
            }
        }
        if let Ok(mode) = std::env::var(ENV_REPLY_MODE) {
            match parse_reply_mode(&mode) {
                Some(mode) => self.client.reply_mode = mode,
                None => warn!(%mode, "{ENV_REPLY_MODE} must be \"shared\" or \"per_call\", ignoring"),
            }
        }
        if let Ok(mode) = std::env::var(ENV_ACK_MODE) {
            match parse_ack_mode(&mode) {
                Some(mode) => self.dispatcher.ack_mode = mode,
                None => warn!(%mode, "{ENV_ACK_MODE} must be \"auto\" or \"manual\", ignoring"),
            }
        }
    }
}

fn parse_reply_mode(value: &str) -> Option<ReplyMode> {
    match value {
        "shared" => Some(ReplyMode::Shared),
        "per_call" | "per-call" => Some(ReplyMode::PerCall),
        _ => None,
    }
}

fn parse_ack_mode(value: &str) -> Option<switchboard_broker::AckMode> {
    match value {
        "auto" => Some(switchboard_broker::AckMode::Auto),
        "manual" => Some(switchboard_broker::AckMode::Manual),
        _ => None,
    }
}
