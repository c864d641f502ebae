use async_trait::async_trait;
use common::ProductId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::product::{NewProduct, Product, ProductUpdate};
use crate::store::{ProductStore, Reservation, ReservationOutcome};
use crate::{InventoryError, Result};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, stock, created_at, updated_at";

/// PostgreSQL-backed product store.
///
/// Reservations run in one transaction: the ledger row is claimed first,
/// then stock is decremented with a conditional `UPDATE`, so the row lock
/// taken by the update serializes concurrent reservations of a product.
#[derive(Clone)]
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    /// Creates a new PostgreSQL product store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the inventory database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations/inventory")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price_cents: row.try_get("price_cents")?,
            stock: to_stock(row.try_get("stock")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn to_stock(value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| InventoryError::Corrupt(format!("stock out of range: {value}")))
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    async fn create(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;

        let row = sqlx::query(&format!(
            "INSERT INTO products (name, description, price_cents, stock) \
             VALUES ($1, $2, $3, $4) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(i64::from(product.stock))
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn update(&self, id: ProductId, update: ProductUpdate) -> Result<Option<Product>> {
        update.validate()?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                stock = COALESCE($5, stock),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price_cents)
        .bind(update.stock.map(i64::from))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn delete(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reserve(&self, reservation: &Reservation) -> Result<ReservationOutcome> {
        let quantity = i64::from(reservation.quantity);
        let mut tx = self.pool.begin().await?;

        // A concurrent duplicate blocks on the primary key until we commit,
        // then takes the replay branch.
        let claimed = sqlx::query(
            r#"
            INSERT INTO stock_reservations (correlation_id, product_id, quantity, granted)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (correlation_id) DO NOTHING
            "#,
        )
        .bind(reservation.correlation_id.as_str())
        .bind(reservation.product_id.as_i64())
        .bind(quantity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            let granted: bool = sqlx::query_scalar(
                "SELECT granted FROM stock_reservations WHERE correlation_id = $1",
            )
            .bind(reservation.correlation_id.as_str())
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(ReservationOutcome::Replayed { granted });
        }

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(reservation.product_id.as_i64())
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match remaining {
            Some(stock) => ReservationOutcome::Reserved {
                remaining: to_stock(stock)?,
            },
            None => {
                let available: Option<i64> =
                    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                        .bind(reservation.product_id.as_i64())
                        .fetch_optional(&mut *tx)
                        .await?;
                match available {
                    Some(stock) => ReservationOutcome::InsufficientStock {
                        available: to_stock(stock)?,
                    },
                    None => ReservationOutcome::UnknownProduct,
                }
            }
        };

        if outcome.is_granted() {
            sqlx::query("UPDATE stock_reservations SET granted = TRUE WHERE correlation_id = $1")
                .bind(reservation.correlation_id.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }
}
