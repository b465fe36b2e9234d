//! CORS layer construction from config.

use crate::config::{ConfigError, CorsConfig};
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

/// Build the CORS layer. Callers only reach this when CORS is enabled;
/// the origin string was validated with the rest of the config.
pub fn create_cors_layer(config: &CorsConfig) -> Result<CorsLayer, ConfigError> {
    if config.allow_origin == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origin = config
        .allow_origin
        .parse::<HeaderValue>()
        .map_err(|_| ConfigError::InvalidCorsOrigin(config.allow_origin.clone()))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}
