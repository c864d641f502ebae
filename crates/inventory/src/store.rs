use async_trait::async_trait;
use common::{CorrelationId, ProductId};

use crate::Result;
use crate::product::{NewProduct, Product, ProductUpdate};

/// A request to take `quantity` units of a product out of stock.
///
/// The correlation ID doubles as the idempotency key: a store that has
/// already decided a reservation with this ID answers with that decision
/// instead of deciding again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub correlation_id: CorrelationId,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl Reservation {
    pub fn new(correlation_id: CorrelationId, product_id: ProductId, quantity: u32) -> Self {
        Self {
            correlation_id,
            product_id,
            quantity,
        }
    }
}

/// What a store decided for a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Stock was decremented.
    Reserved { remaining: u32 },
    /// The product exists but holds fewer units than requested.
    InsufficientStock { available: u32 },
    /// No product with the requested ID.
    UnknownProduct,
    /// The reservation was decided earlier; stock was not touched again.
    Replayed { granted: bool },
}

impl ReservationOutcome {
    /// Returns true if the caller may treat the stock as reserved.
    pub fn is_granted(&self) -> bool {
        matches!(
            self,
            ReservationOutcome::Reserved { .. } | ReservationOutcome::Replayed { granted: true }
        )
    }

    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationOutcome::Reserved { .. } => "reserved",
            ReservationOutcome::InsufficientStock { .. } => "insufficient_stock",
            ReservationOutcome::UnknownProduct => "unknown_product",
            ReservationOutcome::Replayed { .. } => "replayed",
        }
    }
}

/// Persistence for products.
///
/// All implementations must be thread-safe (Send + Sync). `reserve` must be
/// atomic per product: two concurrent reservations that each fit the stock
/// on their own must not both succeed if together they exceed it.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Creates a product and assigns its ID.
    async fn create(&self, product: NewProduct) -> Result<Product>;

    /// Loads a product by ID.
    async fn get(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists all products ordered by ID.
    async fn list(&self) -> Result<Vec<Product>>;

    /// Applies a partial update. Returns `None` if the product is missing.
    async fn update(&self, id: ProductId, update: ProductUpdate) -> Result<Option<Product>>;

    /// Deletes a product. Returns false if it did not exist.
    async fn delete(&self, id: ProductId) -> Result<bool>;

    /// Decrements stock by the reserved quantity iff enough is available.
    async fn reserve(&self, reservation: &Reservation) -> Result<ReservationOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_outcomes() {
        assert!(ReservationOutcome::Reserved { remaining: 0 }.is_granted());
        assert!(ReservationOutcome::Replayed { granted: true }.is_granted());
        assert!(!ReservationOutcome::Replayed { granted: false }.is_granted());
        assert!(!ReservationOutcome::InsufficientStock { available: 2 }.is_granted());
        assert!(!ReservationOutcome::UnknownProduct.is_granted());
    }
}
