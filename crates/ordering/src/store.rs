use async_trait::async_trait;
use common::OrderId;

use crate::Result;
use crate::order::{NewOrder, Order, OrderUpdate};

/// Persistence for orders.
///
/// The store never talks to the inventory service; stock is checked before
/// an order reaches it.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores an order and assigns its ID.
    async fn create(&self, order: NewOrder) -> Result<Order>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists all orders ordered by ID.
    async fn list(&self) -> Result<Vec<Order>>;

    /// Applies a partial update. Returns `None` if the order is missing.
    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>>;

    /// Deletes an order. Returns false if it did not exist.
    async fn delete(&self, id: OrderId) -> Result<bool>;
}
