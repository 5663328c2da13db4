use async_trait::async_trait;
use common::OrderId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{InventoryError, InventoryStore, Reservation, Result, StockLevel};

/// Tenant used when none is configured.
pub const DEFAULT_TENANT: &str = "default";

/// PostgreSQL-backed stock ledger scoped to one tenant.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
    tenant_id: String,
}

impl PostgresInventoryStore {
    /// Creates a ledger for the default tenant.
    pub fn new(pool: PgPool) -> Self {
        Self::for_tenant(pool, DEFAULT_TENANT)
    }

    /// Creates a ledger scoped to `tenant_id`.
    pub fn for_tenant(pool: PgPool, tenant_id: impl Into<String>) -> Self {
        Self {
            pool,
            tenant_id: tenant_id.into(),
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_level(row: PgRow) -> Result<StockLevel> {
        let sku: String = row.try_get("sku")?;
        let value: i64 = row.try_get("quantity")?;
        let quantity =
            u32::try_from(value).map_err(|_| InventoryError::QuantityOutOfRange {
                sku: sku.clone(),
                value,
            })?;
        Ok(StockLevel { sku, quantity })
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn set_stock(&self, level: StockLevel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (sku, tenant_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (sku, tenant_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            "#,
        )
        .bind(&level.sku)
        .bind(&self.tenant_id)
        .bind(i64::from(level.quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_stock(&self, sku: &str) -> Result<Option<StockLevel>> {
        let row = sqlx::query("SELECT sku, quantity FROM inventory WHERE sku = $1 AND tenant_id = $2")
            .bind(sku)
            .bind(&self.tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_level).transpose()
    }

    async fn list_all(&self) -> Result<Vec<StockLevel>> {
        let rows =
            sqlx::query("SELECT sku, quantity FROM inventory WHERE tenant_id = $1 ORDER BY sku ASC")
                .bind(&self.tenant_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Self::row_to_level).collect()
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    async fn reserve(&self, order_id: &OrderId, sku: &str, quantity: u32) -> Result<Reservation> {
        if quantity == 0 {
            return Ok(Reservation::reserved(order_id, sku, quantity));
        }

        // The sufficiency check and the decrement are one statement, so
        // concurrent reservations serialise on the row lock.
        let result = sqlx::query(
            r#"
            UPDATE inventory
            SET quantity = quantity - $1, updated_at = NOW()
            WHERE sku = $2 AND tenant_id = $3 AND quantity >= $1
            "#,
        )
        .bind(i64::from(quantity))
        .bind(sku)
        .bind(&self.tenant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("conditional decrement matched no row");
            return Ok(Reservation::insufficient(order_id, sku, quantity));
        }
        Ok(Reservation::reserved(order_id, sku, quantity))
    }

    async fn release(&self, sku: &str, quantity: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (sku, tenant_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (sku, tenant_id)
            DO UPDATE SET
                quantity = LEAST(inventory.quantity + EXCLUDED.quantity, $4),
                updated_at = NOW()
            "#,
        )
        .bind(sku)
        .bind(&self.tenant_id)
        .bind(i64::from(quantity))
        .bind(i64::from(u32::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_order(&self, order_id: &OrderId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_reservations (order_id, tenant_id)
            VALUES ($1, $2)
            ON CONFLICT (order_id, tenant_id) DO NOTHING
            "#,
        )
        .bind(order_id.as_str())
        .bind(&self.tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, order_id: &OrderId) -> Result<()> {
        sqlx::query("DELETE FROM inventory_reservations WHERE order_id = $1 AND tenant_id = $2")
            .bind(order_id.as_str())
            .bind(&self.tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
