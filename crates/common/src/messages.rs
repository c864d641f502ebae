//! Messages exchanged between the order and inventory services.
//!
//! Both messages are JSON with camelCase keys. The reply's correlation ID
//! travels as a message property, not in the body.

use serde::{Deserialize, Serialize};

use crate::types::{CorrelationId, ProductId};

/// Durable queue the inventory service consumes stock checks from.
pub const DEFAULT_STOCK_QUEUE: &str = "stock_queue";

/// Asks the inventory service to reserve `quantity` units of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCheckRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Queue the reply must be published to.
    #[serde(alias = "responseQueue", default)]
    pub reply_queue_id: String,
    #[serde(default = "empty_correlation_id")]
    pub correlation_id: CorrelationId,
}

fn empty_correlation_id() -> CorrelationId {
    CorrelationId::from("")
}

impl StockCheckRequest {
    /// Creates a request bound to a reply queue and correlation ID.
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        reply_queue_id: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            product_id,
            quantity,
            reply_queue_id: reply_queue_id.into(),
            correlation_id,
        }
    }

    /// Serializes the request to its JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a request from its JSON wire form.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Outcome of a stock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCheckReply {
    pub stock_available: bool,
}

impl StockCheckReply {
    pub fn available() -> Self {
        Self {
            stock_available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            stock_available: false,
        }
    }

    /// Serializes the reply to its JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a reply from its JSON wire form.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
