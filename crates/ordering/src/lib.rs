//! Order records and stock-checked order placement.
//!
//! An order is stored only after the inventory service reserved its stock.
//! [`OrderCoordinator::place_order`] asks for that reservation over the
//! broker and waits, under a deadline, for the reply that carries its own
//! correlation ID.

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod order;
pub mod pending;
pub mod postgres;
pub mod store;

pub use coordinator::{CoordinatorConfig, OrderCoordinator};
pub use error::{OrderError, Result};
pub use memory::InMemoryOrderStore;
pub use order::{NewOrder, Order, OrderStatus, OrderUpdate, PlaceOrder};
pub use pending::{PendingGuard, PendingRequest, PendingRequests, PendingSlot};
pub use postgres::PostgresOrderStore;
pub use store::OrderStore;
