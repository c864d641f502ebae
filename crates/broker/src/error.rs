use thiserror::Error;

/// Errors raised by broker adapters.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached when connecting.
    #[error("Failed to connect to broker: {0}")]
    Connection(String),

    /// An AMQP protocol or channel error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The named queue does not exist.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// An ack or nack referenced a delivery the broker no longer tracks.
    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(u64),

    /// The broker refused the operation.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
