//! Order error types.

use std::time::Duration;

use broker::BrokerError;
use common::{CorrelationId, OrderId, ProductId};
use thiserror::Error;

/// Errors that can occur while placing or managing orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order request is invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The inventory service refused the reservation.
    #[error("Insufficient stock for product {product_id} (requested {quantity})")]
    InsufficientStock { product_id: ProductId, quantity: u32 },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No stock check reply arrived before the deadline.
    #[error("Stock check {correlation_id} timed out after {waited:?}")]
    Timeout {
        correlation_id: CorrelationId,
        waited: Duration,
    },

    /// The reply queue went away before a matching reply arrived.
    #[error("Reply queue closed before stock check {0} was answered")]
    ReplyChannelClosed(CorrelationId),

    /// The coordinator no longer accepts stock checks.
    #[error("Order coordinator is closed")]
    Closed,

    /// Broker error.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value is outside the range the domain allows.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;
