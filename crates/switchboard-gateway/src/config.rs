//! Gateway configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use switchboard_client::config::humantime_serde;
use thiserror::Error;

/// Invalid gateway configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("call_timeout must be greater than zero")]
    ZeroCallTimeout,
    #[error("cors.allow_origin is not a valid header value: {0}")]
    InvalidCorsOrigin(String),
}

/// Cross-origin settings for browser clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// Allowed origin, `"*"` for any.
    pub allow_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origin: "*".to_string(),
        }
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address.
    pub host: IpAddr,
    /// Bind port.
    pub port: u16,
    /// Deadline for each broker call made on behalf of a request. An HTTP
    /// request never outlives this plus a small overhead.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    pub cors: CorsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
            call_timeout: Duration::from_secs(10),
            cors: CorsConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroCallTimeout);
        }
        if self.cors.enabled
            && self.cors.allow_origin != "*"
            && self.cors.allow_origin.parse::<axum::http::HeaderValue>().is_err()
        {
            return Err(ConfigError::InvalidCorsOrigin(self.cors.allow_origin.clone()));
        }
        Ok(())
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
