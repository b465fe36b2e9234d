//! Handlers and the route registry.
//!
//! The registry is built once at startup and frozen behind an `Arc`;
//! lookups during dispatch are lock-free reads.

use crate::args::ActionArgs;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use switchboard_wire::ActionError;
use tracing::warn;

/// One action implementation.
///
/// Uniform signature on purpose: every handler takes the positional args
/// and returns JSON or a wire error, so the dispatcher needs to know
/// nothing about individual actions.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn invoke(&self, args: ActionArgs) -> Result<Value, ActionError>;
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn Handler>
where
    F: Fn(ActionArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        func,
    })
}

struct FnHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(ActionArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, args: ActionArgs) -> Result<Value, ActionError> {
        (self.func)(args).await
    }
}

/// Routes of one service: `(controller, action)` to handler.
///
/// Populated at startup, then handed to the dispatcher and never mutated
/// again.
#[derive(Default)]
pub struct HandlerRegistry {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing (with a warning) any previous one on
    /// the same route.
    pub fn register(
        &mut self,
        controller: &str,
        action: &str,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        let key = Self::key(controller, action);
        if self.routes.insert(key, handler).is_some() {
            warn!(controller, action, "route registered twice, keeping the later handler");
        }
        self
    }

    /// Chainable registration for building registries inline.
    #[must_use]
    pub fn with(mut self, controller: &str, action: &str, handler: Arc<dyn Handler>) -> Self {
        self.register(controller, action, handler);
        self
    }

    pub fn get(&self, controller: &str, action: &str) -> Option<&Arc<dyn Handler>> {
        self.routes.get(&Self::key(controller, action))
    }

    pub fn contains(&self, controller: &str, action: &str) -> bool {
        self.routes.contains_key(&Self::key(controller, action))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn key(controller: &str, action: &str) -> String {
        format!("{controller}.{action}")
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<&String> = self.routes.keys().collect();
        routes.sort();
        f.debug_struct("HandlerRegistry")
            .field("routes", &routes)
            .finish()
    }
}
