//! # Switchboard Gateway - HTTP to Broker Translation
//!
//! REST-ish front door for queue-backed services. The path names the
//! target, the verb names the action:
//!
//! ```text
//! GET    /api/:service/:controller        -> getAllAction([query])
//! GET    /api/:service/:controller/*id    -> getByIdAction([id, body])
//! POST   /api/:service/:controller        -> postAction([body])
//! PUT    /api/:service/:controller/*id    -> putAction([id, body])
//! DELETE /api/:service/:controller/*id    -> deleteAction([id, body])
//! ```
//!
//! Anything else on those paths is `405`. A successful call returns the
//! service's JSON result as-is with `200`; any call failure, whatever its
//! cause, becomes `500 {"error": "..."}`. The gateway deliberately does
//! not map service-side error kinds onto HTTP status codes.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod cors;
pub mod routes;
pub mod service;

// Re-export main types
pub use config::{ConfigError, CorsConfig, GatewayConfig};
pub use service::{GatewayError, GatewayService};
