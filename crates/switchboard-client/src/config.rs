//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How reply queues are provisioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// One exclusive reply queue per client, demultiplexed by correlation
    /// token through the pending table. Cheapest per call.
    #[default]
    Shared,
    /// A fresh exclusive queue per call, deleted when the call finishes.
    /// No state shared between calls, at the price of a declare and a
    /// subscribe on every call.
    PerCall,
}

/// Invalid configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("default_timeout must be greater than zero")]
    ZeroTimeout,
    #[error("cleanup_interval must be greater than zero")]
    ZeroCleanupInterval,
}

/// Tunables for [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline applied to calls that do not override it.
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// Reply queue lifecycle, see [`ReplyMode`].
    pub reply_mode: ReplyMode,

    /// How often abandoned pending entries are swept. Entries normally die
    /// with their call; the sweep only catches calls whose futures were
    /// dropped before their deadline.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            reply_mode: ReplyMode::default(),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::ZeroCleanupInterval);
        }
        Ok(())
    }
}

/// Durations as human-readable strings ("250ms", "10s", "1m") in config
/// files, instead of serde's default struct form.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be tried before the bare "s" suffix.
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Plain number means seconds.
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
