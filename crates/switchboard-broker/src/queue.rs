//! Queue declaration and acknowledgement policy.

use serde::{Deserialize, Serialize};

/// What to declare: a shared named queue, or an anonymous exclusive one.
///
/// Named queues are the addresses services listen on; declaring the same
/// name twice is idempotent. Anonymous queues get a generated name, admit a
/// single consumer, and are deleted when that consumer drops. They exist
/// for reply traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    name: Option<String>,
    exclusive: bool,
}

impl QueueSpec {
    /// A shared queue with a well-known name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            exclusive: false,
        }
    }

    /// An auto-named exclusive queue, deleted with its consumer.
    pub fn anonymous() -> Self {
        Self {
            name: None,
            exclusive: true,
        }
    }

    /// Mark a named queue exclusive.
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

/// When a delivery stops being the broker's problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Removed on receive. A consumer that dies mid-message loses it.
    #[default]
    Auto,
    /// Held until [`Broker::ack`](crate::Broker::ack); requeued if the
    /// consumer drops first.
    Manual,
}
