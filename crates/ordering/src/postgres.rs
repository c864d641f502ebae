use async_trait::async_trait;
use common::{OrderId, ProductId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::order::{NewOrder, Order, OrderUpdate};
use crate::store::OrderStore;
use crate::{OrderError, Result};

const ORDER_COLUMNS: &str = "id, product_id, quantity, status, created_at, updated_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the ordering database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations/ordering")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let quantity: i64 = row.try_get("quantity")?;
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| OrderError::Corrupt(format!("quantity out of range: {quantity}")))?,
            status: status
                .parse()
                .map_err(|_| OrderError::Corrupt(format!("unknown status: {status}")))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(&format!(
            "INSERT INTO orders (product_id, quantity, status) \
             VALUES ($1, $2, $3) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.product_id.as_i64())
        .bind(i64::from(order.quantity))
        .bind(order.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_order(row)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>> {
        update.validate()?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET
                product_id = COALESCE($2, product_id),
                quantity = COALESCE($3, quantity),
                status = COALESCE($4, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(update.product_id.map(|p| p.as_i64()))
        .bind(update.quantity.map(i64::from))
        .bind(update.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

