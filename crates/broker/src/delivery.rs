//! Message metadata and deliveries handed to consumers.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Per-message metadata carried alongside the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    /// Token echoed from a request into its reply.
    pub correlation_id: Option<String>,
    /// Queue the receiver should answer on.
    pub reply_to: Option<String>,
    /// Time the message may wait in its queue before the broker discards it.
    pub expiration: Option<Duration>,
}

impl MessageProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Returns true if the message carries exactly this correlation ID.
    pub fn correlates_with(&self, correlation_id: &str) -> bool {
        self.correlation_id.as_deref() == Some(correlation_id)
    }
}

/// Settles a delivery with the broker that produced it.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<()>;

    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// A message received from a queue, waiting to be settled.
pub struct Delivery {
    pub delivery_tag: u64,
    pub payload: Vec<u8>,
    pub properties: MessageProperties,
    /// True if the broker delivered this message before without an ack.
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        payload: Vec<u8>,
        properties: MessageProperties,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            payload,
            properties,
            redelivered,
            acker,
        }
    }

    /// Confirms the message was processed; the broker forgets it.
    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    /// Discards the message without redelivery.
    pub async fn reject(self) -> Result<()> {
        self.acker.nack(false).await
    }

    /// Returns the message to its queue for redelivery.
    pub async fn requeue(self) -> Result<()> {
        self.acker.nack(true).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("payload_len", &self.payload.len())
            .field("properties", &self.properties)
            .field("redelivered", &self.redelivered)
            .finish()
    }
}
