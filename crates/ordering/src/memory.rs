use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use tokio::sync::RwLock;

use crate::Result;
use crate::order::{NewOrder, Order, OrderUpdate};
use crate::store::OrderStore;

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: BTreeMap<OrderId, Order>,
    next_id: i64,
}

/// In-memory order store for testing and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn len(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let now = Utc::now();
        let created = Order {
            id: OrderId::new(state.next_id),
            product_id: order.product_id,
            quantity: order.quantity,
            status: order.status,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        Ok(self.state.read().await.orders.values().cloned().collect())
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>> {
        update.validate()?;

        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        update.apply(order);
        Ok(Some(order.clone()))
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        Ok(self.state.write().await.orders.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use common::ProductId;

    use super::*;
    use crate::order::OrderStatus;

    #[tokio::test]
    async fn test_crud() {
        let store = InMemoryOrderStore::new();
        let order = store
            .create(NewOrder::pending(ProductId::new(1), 3))
            .await
            .unwrap();
        assert_eq!(order.id, OrderId::new(1));
        assert_eq!(order.status, OrderStatus::Pending);

        let updated = store
            .update(
                order.id,
                OrderUpdate {
                    status: Some(OrderStatus::Rejected),
                    ..OrderUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Rejected);
        assert_eq!(updated.quantity, 3);

        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.delete(order.id).await.unwrap());
        assert!(store.is_empty().await);
        assert!(store.get(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_order() {
        let store = InMemoryOrderStore::new();
        let result = store
            .update(OrderId::new(9), OrderUpdate::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
