//! # Gateway Server Lifecycle
//!
//! Validates configuration, stacks middleware over the route table and
//! runs the HTTP server until a shutdown future resolves.

use crate::config::{ConfigError, GatewayConfig};
use crate::cors::create_cors_layer;
use crate::routes::{api_router, GatewayState};
use axum::Router;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use switchboard_client::RpcClient;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Headroom on top of the per-call deadline. The HTTP layer must not cut
/// the connection before the broker call can time out and answer with a
/// JSON error body.
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Errors raised while bringing the HTTP server up or running it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("http server error: {0}")]
    Serve(#[from] io::Error),
}

/// HTTP front door for the message fabric. One instance serves any
/// number of backend services; routing happens per request from the
/// path segments.
pub struct GatewayService {
    client: RpcClient,
    config: GatewayConfig,
    cors: Option<CorsLayer>,
}

impl std::fmt::Debug for GatewayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayService")
            .field("config", &self.config)
            .field("cors", &self.cors)
            .finish_non_exhaustive()
    }
}

impl GatewayService {
    /// Configuration problems surface here, before any socket is bound.
    pub fn new(client: RpcClient, config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let cors = if config.cors.enabled {
            Some(create_cors_layer(&config.cors)?)
        } else {
            None
        };
        Ok(Self {
            client,
            config,
            cors,
        })
    }

    /// Route table with the full middleware stack applied. Public so
    /// tests can drive the gateway without a socket.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = GatewayState::new(self.client.clone(), &self.config);
        let mut router = api_router(state)
            .layer(TimeoutLayer::new(
                self.config.call_timeout + HTTP_TIMEOUT_MARGIN,
            ))
            .layer(TraceLayer::new_for_http());
        if let Some(cors) = &self.cors {
            router = router.layer(cors.clone());
        }
        router
    }

    /// Bind and serve until `shutdown` resolves. In-flight requests are
    /// drained before this returns.
    pub async fn serve<S>(self, shutdown: S) -> Result<(), GatewayError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "http gateway listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("http gateway stopped");
        Ok(())
    }
}
