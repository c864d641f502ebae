//! Order record and the inputs that create or change it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// Lifecycle status of a stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Stock was reserved; the order awaits fulfillment.
    #[default]
    Pending,
    /// The order was turned down after creation.
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(OrderError::Validation(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for an order about to be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrder {
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: OrderStatus,
}

impl NewOrder {
    /// Creates a pending order.
    pub fn pending(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            status: OrderStatus::Pending,
        }
    }
}

/// Partial update of an order; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderUpdate {
    pub product_id: Option<ProductId>,
    pub quantity: Option<u32>,
    pub status: Option<OrderStatus>,
}

impl OrderUpdate {
    pub fn validate(&self) -> Result<(), OrderError> {
        if let Some(product_id) = self.product_id {
            validate_product_id(product_id)?;
        }
        if self.quantity == Some(0) {
            return Err(OrderError::Validation(
                "quantity must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies the set fields to `order` and bumps `updated_at`.
    pub fn apply(&self, order: &mut Order) {
        if let Some(product_id) = self.product_id {
            order.product_id = product_id;
        }
        if let Some(quantity) = self.quantity {
            order.quantity = quantity;
        }
        if let Some(status) = self.status {
            order.status = status;
        }
        order.updated_at = Utc::now();
    }
}

/// An order placement request as a client sends it.
///
/// Fields are kept wide so out-of-range input is reported as a validation
/// error rather than a decoding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub product_id: i64,
    pub quantity: i64,
}

impl PlaceOrder {
    pub fn new(product_id: i64, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    /// Checks the request and returns the typed product ID and quantity.
    pub fn validate(&self) -> Result<(ProductId, u32), OrderError> {
        let product_id = ProductId::new(self.product_id);
        validate_product_id(product_id)?;

        let quantity = u32::try_from(self.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                OrderError::Validation(format!(
                    "quantity must be a positive integer, got {}",
                    self.quantity
                ))
            })?;

        Ok((product_id, quantity))
    }
}

fn validate_product_id(product_id: ProductId) -> Result<(), OrderError> {
    if !product_id.is_well_formed() {
        return Err(OrderError::Validation(format!(
            "product id must be a positive integer, got {product_id}"
        )));
    }
    Ok(())
}
