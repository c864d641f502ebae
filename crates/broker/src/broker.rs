//! The broker trait the services depend on.

use async_trait::async_trait;

use crate::delivery::{Delivery, MessageProperties};
use crate::error::Result;

/// Operations the order and inventory services need from a message broker.
///
/// Implementations are cheap to clone and safe to share across tasks; one
/// instance is built at startup and handed to every component that talks to
/// the broker.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Declares a durable, shared queue. Declaring an existing queue is a no-op.
    async fn declare_queue(&self, name: &str) -> Result<()>;

    /// Declares a broker-named queue that only this connection can use.
    ///
    /// Returns the generated queue name.
    async fn declare_exclusive_queue(&self) -> Result<String>;

    /// Publishes a payload to a queue through the default exchange.
    ///
    /// Messages sent to a queue that does not exist are dropped by the broker.
    async fn publish(&self, queue: &str, payload: Vec<u8>, properties: MessageProperties)
    -> Result<()>;

    /// Starts consuming a queue with manual acknowledgment.
    async fn consume(&self, queue: &str) -> Result<Box<dyn Subscription>>;

    /// Deletes a queue, discarding any messages still in it.
    async fn delete_queue(&self, name: &str) -> Result<()>;

    /// Returns true while the connection to the broker is usable.
    fn is_connected(&self) -> bool;
}

/// A consumer attached to one queue.
///
/// Deliveries handed out but neither acked nor rejected are returned to the
/// queue when the subscription goes away.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery.
    ///
    /// Returns `None` once the queue is deleted or the consumer is cancelled.
    async fn next(&mut self) -> Result<Option<Delivery>>;
}
