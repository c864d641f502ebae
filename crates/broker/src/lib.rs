//! Message broker adapter for the stock-check exchange.
//!
//! The [`Broker`] trait is the only surface the order and inventory services
//! see: durable queue declaration, exclusive reply queues, publishing with
//! correlation metadata, and manual-ack consumption one message at a time.
//!
//! Two implementations are provided:
//! - [`AmqpBroker`] talks AMQP 0-9-1 to RabbitMQ through `lapin`
//! - [`InMemoryBroker`] keeps queues in process memory, for tests and
//!   single-process runs

pub mod amqp;
pub mod broker;
pub mod delivery;
pub mod error;
pub mod memory;

pub use amqp::{AmqpBroker, AmqpOptions};
pub use broker::{Broker, Subscription};
pub use delivery::{Acknowledger, Delivery, MessageProperties};
pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
