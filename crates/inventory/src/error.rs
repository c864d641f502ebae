//! Inventory error types.

use broker::BrokerError;
use common::ProductId;
use thiserror::Error;

/// Errors raised by product stores and the reservation worker.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Product fields failed validation.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// A stock check request could not be understood or answered.
    #[error("Malformed stock check request: {0}")]
    Malformed(String),

    /// A stored value is outside the range the domain allows.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The store cannot serve requests right now.
    #[error("Product store unavailable: {0}")]
    Unavailable(String),

    /// The broker ended the consumer on the stock queue.
    #[error("Consumer on queue '{0}' was cancelled by the broker")]
    ConsumerCancelled(String),

    /// Broker error while replying.
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
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
