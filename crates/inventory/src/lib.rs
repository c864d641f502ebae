//! Product stock records and the worker that reserves stock for orders.
//!
//! The inventory service is the single owner of `Product::stock`. Order
//! placement never touches it directly; instead the order service publishes a
//! stock check, and a [`ReservationWorker`] consuming the stock queue reserves
//! the quantity (or refuses) and replies on the caller's queue.
//!
//! Stores implement [`ProductStore`]; reservations are atomic per product and
//! idempotent per correlation ID, so concurrent checks cannot oversell and a
//! redelivered check is answered without reserving twice.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod store;
pub mod worker;

pub use error::{InventoryError, Result};
pub use memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;
pub use product::{NewProduct, Product, ProductUpdate};
pub use store::{ProductStore, Reservation, ReservationOutcome};
pub use worker::ReservationWorker;
