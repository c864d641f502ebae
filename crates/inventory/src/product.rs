//! Product record and the inputs that create or change it.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// A product and its authoritative stock count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    /// Units available for reservation. Never negative.
    pub stock: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if `quantity` units can be reserved right now.
    pub fn can_reserve(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}

/// Fields for a product about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub stock: u32,
}

impl NewProduct {
    /// Creates a product with a name and initial stock.
    pub fn new(name: impl Into<String>, stock: u32) -> Self {
        Self {
            name: name.into(),
            description: None,
            price_cents: None,
            stock,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_price_cents(mut self, price_cents: i64) -> Self {
        self.price_cents = Some(price_cents);
        self
    }

    /// Checks the fields a store relies on.
    pub fn validate(&self) -> Result<(), InventoryError> {
        validate_name(&self.name)?;
        validate_price(self.price_cents)
    }
}

/// Partial update of a product; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    /// Replaces the stock count (restock or correction).
    pub stock: Option<u32>,
}

impl ProductUpdate {
    pub fn validate(&self) -> Result<(), InventoryError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        validate_price(self.price_cents)
    }

    /// Applies the set fields to `product` and bumps `updated_at`.
    pub fn apply(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(description) = &self.description {
            product.description = Some(description.clone());
        }
        if let Some(price_cents) = self.price_cents {
            product.price_cents = Some(price_cents);
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        product.updated_at = Utc::now();
    }
}

fn validate_name(name: &str) -> Result<(), InventoryError> {
    if name.trim().is_empty() {
        return Err(InventoryError::InvalidProduct(
            "name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_price(price_cents: Option<i64>) -> Result<(), InventoryError> {
    match price_cents {
        Some(cents) if cents < 0 => Err(InventoryError::InvalidProduct(format!(
            "price must not be negative, got {cents}"
        ))),
        _ => Ok(()),
    }
}
