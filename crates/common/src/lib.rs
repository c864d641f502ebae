//! Shared identifiers and wire messages for the order and inventory services.

pub mod messages;
pub mod types;

pub use messages::{DEFAULT_STOCK_QUEUE, StockCheckReply, StockCheckRequest};
pub use types::{CorrelationId, OrderId, ProductId};
