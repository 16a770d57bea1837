use async_trait::async_trait;
use larder_catalog::{Product, StockAdjustment, StockStore};
use larder_core::StoreResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::db_error;

/// Products and their live stock counters in Postgres.
///
/// Every stock write is a single conditional `UPDATE ... RETURNING`, so two
/// reservations racing on the same row are serialized by the row lock and the
/// loser sees the already decremented value.
pub struct PgStockStore {
    pool: PgPool,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    category: String,
    unit: String,
    base_price_cents: i64,
    on_hand: i32,
    min_stock: i32,
    is_active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            category: row.category,
            unit: row.unit,
            base_price_cents: row.base_price_cents,
            on_hand: row.on_hand,
            min_stock: row.min_stock,
            is_active: row.is_active,
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, name, category, unit, base_price_cents, on_hand, min_stock, is_active";

#[async_trait]
impl StockStore for PgStockStore {
    async fn get_products(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE id = ANY($1) AND is_active",
            PRODUCT_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn on_hand(&self, product_id: Uuid) -> StoreResult<Option<i32>> {
        sqlx::query_scalar("SELECT on_hand FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn try_decrement(&self, product_id: Uuid, quantity: i32) -> StoreResult<Option<i32>> {
        if quantity <= 0 {
            return Ok(None);
        }
        sqlx::query_scalar(
            "UPDATE products SET on_hand = on_hand - $2, updated_at = NOW()
             WHERE id = $1 AND on_hand >= $2
             RETURNING on_hand",
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn increment(&self, product_id: Uuid, quantity: i32) -> StoreResult<Option<i32>> {
        if quantity <= 0 {
            return Ok(None);
        }
        sqlx::query_scalar(
            "UPDATE products SET on_hand = on_hand + $2, updated_at = NOW()
             WHERE id = $1
             RETURNING on_hand",
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn low_stock(&self) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {} FROM products WHERE is_active AND on_hand <= min_stock ORDER BY name",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn record_adjustment(&self, adjustment: &StockAdjustment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (id, product_id, kind, delta, previous_quantity, new_quantity, reason, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(adjustment.id)
        .bind(adjustment.product_id)
        .bind(adjustment.kind.as_str())
        .bind(adjustment.delta)
        .bind(adjustment.previous_quantity)
        .bind(adjustment.new_quantity)
        .bind(&adjustment.reason)
        .bind(&adjustment.notes)
        .bind(adjustment.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
