//! # Switchboard Runtime - A Self-Contained Node
//!
//! Everything needed to run Switchboard as one process: configuration
//! loading, broker and gateway wiring, and two demo services that
//! exercise the REST conventions. The `switchboard` binary is a thin
//! wrapper over [`SwitchboardRuntime`]; embedders can use the same type
//! with their own handler registries instead of the demo ones.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod demo;
pub mod runtime;

// Re-export main types
pub use config::{ConfigLoadError, RuntimeConfig};
pub use runtime::{RuntimeError, SwitchboardRuntime};
