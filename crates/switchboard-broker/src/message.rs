//! What a consumer receives: body bytes, reply metadata, delivery tag.

use std::fmt;

/// Broker-level metadata travelling beside a message body.
///
/// Both fields are opaque to the broker. `reply_to` names the queue a
/// response should go to and is absent on fire-and-forget publishes;
/// `correlation_id` is echoed back so the caller can pair the reply with
/// its pending call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

impl MessageHeaders {
    /// Headers for a request that expects a reply.
    pub fn for_call(reply_to: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            reply_to: Some(reply_to.into()),
            correlation_id: Some(correlation_id.into()),
        }
    }

    /// Headers echoed on a reply: the token comes back, `reply_to` does not.
    pub fn for_reply(correlation_id: impl Into<String>) -> Self {
        Self {
            reply_to: None,
            correlation_id: Some(correlation_id.into()),
        }
    }
}

/// Per-queue identifier of one delivery, used to acknowledge it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub headers: MessageHeaders,
    pub tag: DeliveryTag,
    /// True when this delivery was requeued after a consumer dropped it
    /// unacknowledged.
    pub redelivered: bool,
}
