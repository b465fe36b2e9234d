//! # Process Wiring
//!
//! Builds the broker, the shared RPC client, one dispatcher per
//! registered service and the HTTP gateway in front of them, then runs
//! the lot as a unit until a shutdown future resolves.
//!
//! ## Startup and Shutdown Order
//!
//! ```text
//! start:  broker ──► dispatchers ──► gateway listener
//! stop:   gateway drains ──► broker closes ──► consume loops join
//! ```
//!
//! Closing the broker ends every consume loop, so dispatcher joins
//! cannot hang after the gateway has gone down.

use crate::config::RuntimeConfig;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use switchboard_broker::{Broker, InMemoryBroker};
use switchboard_client::RpcClient;
use switchboard_dispatch::{DispatchError, HandlerRegistry, ServiceDispatcher};
use switchboard_gateway::{GatewayError, GatewayService};
use thiserror::Error;
use tracing::info;

/// Failures while assembling or running the process.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("invalid client configuration: {0}")]
    ClientConfig(#[from] switchboard_client::ConfigError),
}

/// One process hosting a broker, any number of services and the HTTP
/// gateway in front of them.
pub struct SwitchboardRuntime {
    config: RuntimeConfig,
    broker: Arc<InMemoryBroker>,
    client: RpcClient,
    dispatchers: Vec<ServiceDispatcher>,
}

impl SwitchboardRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let broker = Arc::new(InMemoryBroker::new());
        let client = RpcClient::with_config(
            Arc::clone(&broker) as Arc<dyn Broker>,
            config.client.clone(),
        )?;
        Ok(Self {
            config,
            broker,
            client,
            dispatchers: Vec::new(),
        })
    }

    /// The broker every hosted component talks through.
    #[must_use]
    pub fn broker(&self) -> Arc<InMemoryBroker> {
        Arc::clone(&self.broker)
    }

    /// A handle on the shared RPC client. Valid for the life of the
    /// broker, including after [`run`](Self::run) has been called.
    #[must_use]
    pub fn client(&self) -> RpcClient {
        self.client.clone()
    }

    /// Queue up a service. Its dispatcher starts consuming when
    /// [`run`](Self::run) is called.
    pub fn add_service(&mut self, service: impl Into<String>, registry: HandlerRegistry) {
        let dispatcher = ServiceDispatcher::new(
            Arc::clone(&self.broker) as Arc<dyn Broker>,
            service,
            registry,
            self.config.dispatcher.clone(),
        );
        self.dispatchers.push(dispatcher);
    }

    /// Run everything until `shutdown` resolves. In-flight HTTP requests
    /// drain, then the broker is closed and the consume loops joined.
    pub async fn run<S>(self, shutdown: S) -> Result<(), RuntimeError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let mut loops = Vec::with_capacity(self.dispatchers.len());
        for dispatcher in &self.dispatchers {
            loops.push(dispatcher.start().await?);
        }
        info!(services = self.dispatchers.len(), "dispatchers running");

        let gateway = GatewayService::new(self.client.clone(), self.config.gateway.clone())?;
        let served = gateway.serve(shutdown).await;

        self.broker.close().await;
        join_all(loops).await;
        info!("runtime stopped");

        served.map_err(RuntimeError::from)
    }
}
