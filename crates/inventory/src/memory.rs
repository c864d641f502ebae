use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CorrelationId, ProductId};
use tokio::sync::RwLock;

use crate::product::{NewProduct, Product, ProductUpdate};
use crate::store::{ProductStore, Reservation, ReservationOutcome};
use crate::{InventoryError, Result};

/// Decisions remembered for redelivered stock checks.
pub const DEFAULT_LEDGER_CAPACITY: usize = 100_000;

#[derive(Debug)]
struct InMemoryProductState {
    products: BTreeMap<ProductId, Product>,
    next_id: i64,
    /// Decided reservations by correlation ID: true if granted.
    ledger: HashMap<CorrelationId, bool>,
    /// Ledger keys, oldest first.
    ledger_order: VecDeque<CorrelationId>,
    ledger_capacity: usize,
    fail_on_reserve: bool,
}

impl InMemoryProductState {
    fn new(ledger_capacity: usize) -> Self {
        Self {
            products: BTreeMap::new(),
            next_id: 0,
            ledger: HashMap::new(),
            ledger_order: VecDeque::new(),
            ledger_capacity: ledger_capacity.max(1),
            fail_on_reserve: false,
        }
    }

    /// Records a decision, forgetting the oldest ones past capacity.
    fn record(&mut self, correlation_id: CorrelationId, granted: bool) {
        self.ledger.insert(correlation_id.clone(), granted);
        self.ledger_order.push_back(correlation_id);
        while self.ledger_order.len() > self.ledger_capacity {
            if let Some(oldest) = self.ledger_order.pop_front() {
                self.ledger.remove(&oldest);
            }
        }
    }
}

/// In-memory product store for testing and single-process runs.
///
/// Every mutation happens under one write lock, so a reservation's check and
/// decrement cannot interleave with another reservation.
///
/// The reservation ledger keeps the most recent decisions only; a request
/// redelivered after its entry was evicted is decided again.
#[derive(Debug, Clone)]
pub struct InMemoryProductStore {
    state: Arc<RwLock<InMemoryProductState>>,
}

impl Default for InMemoryProductStore {
    fn default() -> Self {
        Self::with_ledger_capacity(DEFAULT_LEDGER_CAPACITY)
    }
}

impl InMemoryProductStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store remembering at most `capacity` reservations.
    pub fn with_ledger_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryProductState::new(capacity))),
        }
    }

    /// Configures the store to fail every reserve call until reset.
    pub async fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().await.fail_on_reserve = fail;
    }

    /// Returns the number of reservations decided so far.
    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }

    /// Returns the current stock of a product.
    pub async fn stock_of(&self, id: ProductId) -> Option<u32> {
        self.state.read().await.products.get(&id).map(|p| p.stock)
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn create(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;

        let mut state = self.state.write().await;
        state.next_id += 1;
        let now = Utc::now();
        let created = Product {
            id: ProductId::new(state.next_id),
            name: product.name,
            description: product.description,
            price_cents: product.price_cents,
            stock: product.stock,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn update(&self, id: ProductId, update: ProductUpdate) -> Result<Option<Product>> {
        update.validate()?;

        let mut state = self.state.write().await;
        let Some(product) = state.products.get_mut(&id) else {
            return Ok(None);
        };
        update.apply(product);
        Ok(Some(product.clone()))
    }

    async fn delete(&self, id: ProductId) -> Result<bool> {
        Ok(self.state.write().await.products.remove(&id).is_some())
    }

    async fn reserve(&self, reservation: &Reservation) -> Result<ReservationOutcome> {
        let mut state = self.state.write().await;
        if state.fail_on_reserve {
            return Err(InventoryError::Unavailable(
                "reservations disabled".to_string(),
            ));
        }

        if let Some(&granted) = state.ledger.get(&reservation.correlation_id) {
            return Ok(ReservationOutcome::Replayed { granted });
        }

        let outcome = match state.products.get_mut(&reservation.product_id) {
            None => ReservationOutcome::UnknownProduct,
            Some(product) if product.can_reserve(reservation.quantity) => {
                product.stock -= reservation.quantity;
                product.updated_at = Utc::now();
                ReservationOutcome::Reserved {
                    remaining: product.stock,
                }
            }
            Some(product) => ReservationOutcome::InsufficientStock {
                available: product.stock,
            },
        };

        state.record(reservation.correlation_id.clone(), outcome.is_granted());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_stock(stock: u32) -> (InMemoryProductStore, ProductId) {
        let store = InMemoryProductStore::new();
        let product = store.create(NewProduct::new("Widget", stock)).await.unwrap();
        (store, product.id)
    }

    fn reservation(product_id: ProductId, quantity: u32) -> Reservation {
        Reservation::new(CorrelationId::generate(), product_id, quantity)
    }

    #[tokio::test]
    async fn test_crud() {
        let store = InMemoryProductStore::new();
        let a = store.create(NewProduct::new("A", 1)).await.unwrap();
        let b = store.create(NewProduct::new("B", 2)).await.unwrap();
        assert_eq!(a.id, ProductId::new(1));
        assert_eq!(b.id, ProductId::new(2));

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);

        let updated = store
            .update(
                a.id,
                ProductUpdate {
                    name: Some("A2".to_string()),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "A2");
        assert_eq!(updated.stock, 1);

        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());
        assert!(store.get(a.id).await.unwrap().is_none());
        assert!(
            store
                .update(a.id, ProductUpdate::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_product() {
        let store = InMemoryProductStore::new();
        let result = store.create(NewProduct::new("", 1)).await;
        assert!(matches!(result, Err(InventoryError::InvalidProduct(_))));
    }

    #[tokio::test]
    async fn test_reserve_decrements_stock() {
        let (store, id) = store_with_stock(5).await;

        let outcome = store.reserve(&reservation(id, 3)).await.unwrap();
        assert_eq!(outcome, ReservationOutcome::Reserved { remaining: 2 });
        assert_eq!(store.stock_of(id).await, Some(2));
    }

    #[tokio::test]
    async fn test_reserve_insufficient_leaves_stock() {
        let (store, id) = store_with_stock(2).await;

        let outcome = store.reserve(&reservation(id, 3)).await.unwrap();
        assert_eq!(outcome, ReservationOutcome::InsufficientStock { available: 2 });
        assert_eq!(store.stock_of(id).await, Some(2));
    }

    #[tokio::test]
    async fn test_reserve_unknown_product() {
        let store = InMemoryProductStore::new();
        let outcome = store
            .reserve(&reservation(ProductId::new(42), 1))
            .await
            .unwrap();
        assert_eq!(outcome, ReservationOutcome::UnknownProduct);
    }

    #[tokio::test]
    async fn test_replayed_reservation_does_not_decrement_twice() {
        let (store, id) = store_with_stock(5).await;
        let r = reservation(id, 3);

        assert!(store.reserve(&r).await.unwrap().is_granted());
        let replay = store.reserve(&r).await.unwrap();

        assert_eq!(replay, ReservationOutcome::Replayed { granted: true });
        assert_eq!(store.stock_of(id).await, Some(2));
        assert_eq!(store.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn test_ledger_forgets_oldest_decisions_past_capacity() {
        let store = InMemoryProductStore::with_ledger_capacity(2);
        let id = store.create(NewProduct::new("Widget", 10)).await.unwrap().id;

        let first = reservation(id, 1);
        let second = reservation(id, 1);
        let third = reservation(id, 1);
        for r in [&first, &second, &third] {
            assert!(store.reserve(r).await.unwrap().is_granted());
        }
        assert_eq!(store.ledger_len().await, 2);

        let replay = store.reserve(&third).await.unwrap();
        assert_eq!(replay, ReservationOutcome::Replayed { granted: true });
        assert_eq!(store.stock_of(id).await, Some(7));

        // Evicted, so decided afresh.
        let again = store.reserve(&first).await.unwrap();
        assert_eq!(again, ReservationOutcome::Reserved { remaining: 6 });
        assert_eq!(store.ledger_len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let (store, id) = store_with_stock(5).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.reserve(&reservation(id, 1)).await.unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_granted() {
                granted += 1;
            }
        }

        assert_eq!(granted, 5);
        assert_eq!(store.stock_of(id).await, Some(0));
    }

    #[tokio::test]
    async fn test_fail_on_reserve() {
        let (store, id) = store_with_stock(5).await;
        store.set_fail_on_reserve(true).await;

        assert!(store.reserve(&reservation(id, 1)).await.is_err());
        assert_eq!(store.stock_of(id).await, Some(5));
    }
}
